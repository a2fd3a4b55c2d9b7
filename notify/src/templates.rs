//! Email templates, one per event kind.
//!
//! Rendering is pure: it reads the event payload and returns a subject and an HTML
//! body. Every interpolated value is HTML-escaped.
//!
//! Ticket fields are read from the top level of the payload first, then from a
//! nested `ticket` object (`{ "ticket": { "id": 7, "titulo": "..." } }`).

use helpdesk_relay_core::event::{DomainEvent, EventKind};
use std::fmt::Write as _;

const TICKET_ID: &[&[&str]] = &[&["ticketId"], &["ticket", "id"], &["ticket", "_id"]];
const TICKET_TITLE: &[&[&str]] = &[&["titulo"], &["ticket", "titulo"]];
const MESSAGE: &[&[&str]] = &[&["mensaje"], &["message"], &["ticket", "descripcion"]];
const ASSIGNEE: &[&[&str]] = &[&["asignadoA"], &["agente"], &["ticket", "asignadoA"]];
const STATUS: &[&[&str]] = &[&["estado"], &["nuevoEstado"], &["ticket", "estado"]];

/// A rendered email body and subject.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendered {
    /// Subject line.
    pub subject: String,
    /// Short plain-text summary, used for live notifications.
    pub summary: String,
    /// HTML body.
    pub html: String,
}

/// A field the template for this kind cannot do without.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MissingField(pub &'static str);

/// Render the email for `event`.
///
/// # Errors
///
/// Returns [`MissingField`] when a ticket event carries no ticket id.
pub fn render(event: &DomainEvent) -> Result<Rendered, MissingField> {
    match event.kind {
        EventKind::ChatMessage => Ok(chat_message(event)),
        EventKind::TicketCreated => ticket_created(event),
        EventKind::TicketAssigned => ticket_assigned(event),
        EventKind::TicketStatusChanged => ticket_status_changed(event),
    }
}

fn chat_message(event: &DomainEvent) -> Rendered {
    let message = event
        .first_text(MESSAGE)
        .unwrap_or_else(|| "Sin contenido".to_string());
    let sender = event.text("sender");

    let mut content = String::new();
    if let Some(sender) = &sender {
        let _ = write!(content, "<p><strong>De:</strong> {}</p>", escape_html(sender));
    }
    let _ = write!(
        content,
        r#"<div class="message"><p>{}</p></div>"#,
        escape_html(&message)
    );

    let summary = match &sender {
        Some(sender) => format!("{sender}: {message}"),
        None => message,
    };

    Rendered {
        subject: "Nuevo mensaje en chat".to_string(),
        summary,
        html: layout("Nuevo Mensaje en el Chat", &content),
    }
}

fn ticket_created(event: &DomainEvent) -> Result<Rendered, MissingField> {
    let id = event.first_text(TICKET_ID).ok_or(MissingField("ticketId"))?;
    let title = event.first_text(TICKET_TITLE);
    let message = event
        .first_text(MESSAGE)
        .unwrap_or_else(|| "Sin mensaje".to_string());

    let mut content = String::from("<p>Se ha creado un nuevo ticket con los siguientes detalles:</p>");
    let _ = write!(
        content,
        r#"<p>Ticket ID: <span class="ticket-id">#{}</span></p>"#,
        escape_html(&id)
    );
    if let Some(title) = &title {
        let _ = write!(content, "<p><strong>Título:</strong> {}</p>", escape_html(title));
    }
    let _ = write!(
        content,
        "<p><strong>Mensaje:</strong></p><p>{}</p>",
        escape_html(&message)
    );

    let summary = match &title {
        Some(title) => format!("Se ha creado el ticket \"{title}\" exitosamente."),
        None => format!("Se ha creado el ticket #{id} exitosamente."),
    };

    Ok(Rendered {
        subject: format!("Nuevo ticket creado - #{id}"),
        summary,
        html: layout("Nuevo Ticket Creado", &content),
    })
}

fn ticket_assigned(event: &DomainEvent) -> Result<Rendered, MissingField> {
    let id = event.first_text(TICKET_ID).ok_or(MissingField("ticketId"))?;
    let assignee = event.first_text(ASSIGNEE);

    let mut content = format!(
        r#"<p>El ticket <span class="ticket-id">#{}</span> ha sido asignado.</p>"#,
        escape_html(&id)
    );
    if let Some(assignee) = &assignee {
        let _ = write!(content, "<p><strong>Asignado a:</strong> {}</p>", escape_html(assignee));
    }

    Ok(Rendered {
        subject: format!("Ticket asignado - #{id}"),
        summary: format!("El ticket #{id} ha sido asignado."),
        html: layout("Ticket Asignado", &content),
    })
}

fn ticket_status_changed(event: &DomainEvent) -> Result<Rendered, MissingField> {
    let id = event.first_text(TICKET_ID).ok_or(MissingField("ticketId"))?;
    let status = event.first_text(STATUS);

    let mut content = format!(
        r#"<p>El ticket <span class="ticket-id">#{}</span> ha cambiado de estado.</p>"#,
        escape_html(&id)
    );
    if let Some(status) = &status {
        let _ = write!(content, "<p><strong>Nuevo estado:</strong> {}</p>", escape_html(status));
    }

    let summary = match &status {
        Some(status) => format!("El ticket #{id} ahora está en estado {status}."),
        None => format!("El ticket #{id} ha sido actualizado."),
    };

    Ok(Rendered {
        subject: format!("Ticket actualizado - #{id}"),
        summary,
        html: layout("Ticket Actualizado", &content),
    })
}

fn layout(heading: &str, content: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="UTF-8">
    <style>
        body {{ font-family: Arial, sans-serif; }}
        .container {{ max-width: 600px; margin: 0 auto; padding: 20px; }}
        h2 {{ color: #333; }}
        .ticket-id {{ color: #007bff; font-weight: bold; }}
        .message {{ background-color: #f5f5f5; padding: 15px; border-radius: 5px; }}
    </style>
</head>
<body>
    <div class="container">
        <h2>{heading}</h2>
        {content}
    </div>
</body>
</html>"#
    )
}

/// Escape the five HTML-significant characters.
#[must_use]
pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}
