use ratatui::{
    Frame,
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Gauge, List, ListItem, Paragraph, Wrap},
};

use crate::manager::{CatalogSnapshot, MessageRow, MessagesSnapshot, Snapshot};
use crate::session::{ExpirySource, SessionStatus};
use crate::terminal::state::{AppState, ViewMode, rows};
use crate::timer::Tier;

pub fn render(f: &mut Frame, snap: &Snapshot, state: &mut AppState, status_line: Option<&str>) {
    let [header, body, footer] = Layout::vertical([
        Constraint::Length(4),
        Constraint::Min(0),
        Constraint::Length(1),
    ])
    .margin(1)
    .areas(f.area());

    match (snap.status, &snap.address) {
        (SessionStatus::Active | SessionStatus::Expired, Some(address)) => {
            render_header(f, header, snap, address);
            render_body(f, body, snap, state);
        }
        _ => render_pre_session(f, header.union(body), snap),
    }

    render_footer(f, footer, state, status_line.or(snap.last_error.as_deref()));
}

fn tier_color(tier: Tier) -> Color {
    match tier {
        Tier::High => Color::Green,
        Tier::Medium => Color::Yellow,
        Tier::Low => Color::Red,
    }
}

fn render_header(f: &mut Frame, area: Rect, snap: &Snapshot, address: &str) {
    let block = Block::default()
        .title(" Temporary inbox ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow));
    let inner = block.inner(area);
    f.render_widget(block, area);

    let [line, gauge_area] =
        Layout::vertical([Constraint::Length(1), Constraint::Length(1)]).areas(inner);

    let mut spans = vec![Span::styled(
        address.to_string(),
        Style::default().add_modifier(Modifier::BOLD),
    )];
    let cd = &snap.countdown;
    if cd.visible {
        spans.push(Span::raw("  "));
        spans.push(Span::styled(
            format!("{} left", cd.display),
            Style::default().fg(tier_color(cd.tier)),
        ));
    }
    match snap.expired_by {
        Some(ExpirySource::Server) => spans.push(Span::styled(
            "  expired (press D to delete)",
            Style::default().fg(Color::Red),
        )),
        Some(ExpirySource::LocalTimer) => spans.push(Span::styled(
            "  expired",
            Style::default().fg(Color::Red),
        )),
        None => {}
    }
    f.render_widget(Paragraph::new(Line::from(spans)), line);

    if cd.visible {
        let gauge = Gauge::default()
            .gauge_style(Style::default().fg(tier_color(cd.tier)))
            .ratio((cd.progress_percent / 100.0).clamp(0.0, 1.0))
            .label(format!("{:.0}%", cd.progress_percent));
        f.render_widget(gauge, gauge_area);
    }
}

fn render_body(f: &mut Frame, area: Rect, snap: &Snapshot, state: &mut AppState) {
    let title = format!(" Messages ({}) ", snap.message_count);
    let list_block = Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray));

    let opened = state.opened();
    let (list_area, detail_area) = match (state.mode, &opened) {
        (ViewMode::Split, Some(_)) => {
            let [l, r] =
                Layout::horizontal([Constraint::Percentage(40), Constraint::Percentage(60)])
                    .areas(area);
            (l, Some(r))
        }
        _ => (area, None),
    };

    let placeholder = match &snap.messages {
        MessagesSnapshot::Loading => Some(("Loading messages...".to_string(), Color::Gray)),
        MessagesSnapshot::Error(e) => Some((format!("Error loading messages\n{e}"), Color::Red)),
        MessagesSnapshot::Malformed(kind) => Some((
            format!("Invalid data format: expected a list of messages, got {kind}"),
            Color::Red,
        )),
        MessagesSnapshot::Empty => Some((
            "No messages yet\nWaiting for incoming emails".to_string(),
            Color::Gray,
        )),
        MessagesSnapshot::Populated(_) => None,
    };

    if let Some((text, color)) = placeholder {
        let p = Paragraph::new(text)
            .style(Style::default().fg(color))
            .block(list_block)
            .wrap(Wrap { trim: false });
        f.render_widget(p, list_area);
        return;
    }

    let items: Vec<ListItem> = rows(snap).iter().map(row_item).collect();
    let list = List::new(items)
        .block(list_block)
        .highlight_symbol("➜ ")
        .highlight_style(Style::default().fg(Color::Green));
    f.render_stateful_widget(list, list_area, &mut state.list_state);

    if let (Some(area), Some(id)) = (detail_area, opened)
        && let Some(row) = rows(snap).iter().find(|r| r.message.id == id)
    {
        render_detail(f, area, row);
    }
}

fn row_item(row: &MessageRow) -> ListItem<'static> {
    let m = &row.message;
    let marker = if m.seen { "  " } else { "● " };
    let head = Line::from(vec![
        Span::styled(marker, Style::default().fg(Color::Cyan)),
        Span::styled(
            m.sender_label().to_string(),
            Style::default().add_modifier(Modifier::BOLD),
        ),
        Span::styled(format!("  {}", row.received), Style::default().fg(Color::DarkGray)),
    ]);
    let subject = Line::from(format!("  {}", m.subject_label()));
    let intro = Line::from(Span::styled(
        format!("  {}", m.intro.as_deref().unwrap_or_default()),
        Style::default().fg(Color::Gray),
    ));
    ListItem::new(Text::from(vec![head, subject, intro]))
}

fn render_detail(f: &mut Frame, area: Rect, row: &MessageRow) {
    let m = &row.message;
    let block = Block::default()
        .title(" Message ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow));
    let text = Text::from(vec![
        Line::from(vec![
            Span::styled("From: ", Style::default().add_modifier(Modifier::BOLD)),
            Span::raw(format!("{} <{}>", m.sender_label(), m.from.address)),
        ]),
        Line::from(vec![
            Span::styled("Subject: ", Style::default().add_modifier(Modifier::BOLD)),
            Span::raw(m.subject_label().to_string()),
        ]),
        Line::from(vec![
            Span::styled("Received: ", Style::default().add_modifier(Modifier::BOLD)),
            Span::raw(row.received.clone()),
        ]),
        Line::default(),
        Line::from(m.intro.clone().unwrap_or_default()),
    ]);
    f.render_widget(
        Paragraph::new(text).block(block).wrap(Wrap { trim: false }),
        area,
    );
}

/// Catalog and provisioning states shown before an inbox exists.
fn render_pre_session(f: &mut Frame, area: Rect, snap: &Snapshot) {
    let (title, body, color) = match (&snap.catalog, snap.status) {
        (CatalogSnapshot::Loading, _) => ("Loading Domains...", String::new(), Color::Gray),
        (CatalogSnapshot::Failed(e), _) => (
            "Domain Error",
            format!("{e}\nPress R to retry."),
            Color::Red,
        ),
        (CatalogSnapshot::NoDomains, _) => (
            "No Domains Available",
            "There are no active public domains to create an inbox on.\nPress R to check again."
                .to_string(),
            Color::Yellow,
        ),
        (CatalogSnapshot::Ready { .. }, SessionStatus::Provisioning) => (
            "Creating Inbox...",
            "Setting up your temporary email address.".to_string(),
            Color::Gray,
        ),
        (CatalogSnapshot::Ready { .. }, _) if snap.is_deleting => (
            "Deleting Inbox...",
            String::new(),
            Color::Gray,
        ),
        (CatalogSnapshot::Ready { .. }, _) => (
            "Initializing Inbox",
            "Press n to create an inbox.".to_string(),
            Color::Gray,
        ),
    };

    let block = Block::default()
        .title(" Temporary inbox ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray));
    let text = Text::from(vec![
        Line::from(Span::styled(
            title,
            Style::default().fg(color).add_modifier(Modifier::BOLD),
        )),
        Line::default(),
        Line::from(body),
    ]);
    f.render_widget(
        Paragraph::new(text).block(block).wrap(Wrap { trim: false }),
        area,
    );
}

fn render_footer(f: &mut Frame, area: Rect, state: &AppState, status: Option<&str>) {
    if state.confirm_delete.is_some() {
        let prompt = Paragraph::new(Line::from(vec![
            Span::styled("Delete this message? ", Style::default().fg(Color::Red)),
            Span::styled("y", Style::default().add_modifier(Modifier::BOLD)),
            Span::raw("/"),
            Span::styled("n", Style::default().add_modifier(Modifier::BOLD)),
        ]));
        f.render_widget(prompt, area);
        return;
    }

    let mut spans = Vec::new();
    for (k, label) in [
        ("j/k", " move  "),
        ("Enter", " open  "),
        ("r", " refresh  "),
        ("d", " delete  "),
        ("c", " copy  "),
        ("D", " new inbox  "),
        ("q", " quit"),
    ] {
        spans.push(Span::styled(k, Style::default().add_modifier(Modifier::BOLD)));
        spans.push(Span::raw(label));
    }
    if let Some(text) = status {
        spans.push(Span::raw("  | "));
        spans.push(Span::styled(text.to_string(), Style::default().fg(Color::Yellow)));
    }
    f.render_widget(Paragraph::new(Line::from(spans)), area);
}
