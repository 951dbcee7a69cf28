use chrono::Utc;
use tracing::{debug, error};

use crate::models::{CollabError, EditSectionMessage, SectionUpdatedMessage, SendMessage};
use crate::ws::connection::CollabSession;

/// Handle edit-section: validate, broadcast to peers, then persist.
///
/// Broadcast happens first so peers see the edit without waiting on storage;
/// persistence runs on its own task and reports failures back to the sender
/// without retracting the broadcast. Last write wins on the durable record.
pub async fn handle_edit_message(msg: &EditSectionMessage, session: &CollabSession) {
    let Some(report_id) = session.state.registry.joined_room(session.conn_id) else {
        session.send_error(&CollabError::NotInRoom);
        return;
    };

    // The section must belong to the currently joined report.
    match session
        .state
        .store
        .load_section(report_id, msg.section_id)
        .await
    {
        Ok(Some(_)) => {}
        Ok(None) => {
            session.send_error(&CollabError::SectionNotFound);
            return;
        }
        Err(e) => {
            error!("Section lookup failed for {}: {}", msg.section_id, e);
            session.send_error(&CollabError::Persistence(e.to_string()));
            return;
        }
    }

    session.state.registry.broadcast(
        report_id,
        Some(session.conn_id),
        &SendMessage::SectionUpdated(SectionUpdatedMessage {
            section_id: msg.section_id,
            content: msg.content.clone(),
            user_id: session.user.user_id.clone(),
            user_name: session.user.display_name.clone(),
            timestamp: Utc::now().to_rfc3339(),
        }),
    );

    let store = session.state.store.clone();
    let out = session.outbound();
    let section_id = msg.section_id;
    let content = msg.content.clone();
    let user_id = session.user.user_id.clone();
    tokio::spawn(async move {
        if let Err(e) = store
            .update_section_content(section_id, &content, &user_id)
            .await
        {
            error!("Failed to persist edit to section {}: {}", section_id, e);
            let _ = out.send(CollabError::Persistence(e.to_string()).to_event().to_wire());
            return;
        }
        match store
            .append_section_version(report_id, section_id, &content, &user_id)
            .await
        {
            Ok(version) => debug!("Section {} advanced to version {}", section_id, version),
            Err(e) => {
                error!(
                    "Failed to append version entry for section {}: {}",
                    section_id, e
                );
                let _ = out.send(CollabError::Persistence(e.to_string()).to_event().to_wire());
            }
        }
    });
}
