use tracing::{error, info};

use crate::models::{AddCommentMessage, CollabError, CommentView, SendMessage};
use crate::ws::connection::CollabSession;

/// Handle add-comment: persist first, then broadcast the stored record to the
/// whole room, sender included, so every client reconciles against the
/// durable copy rather than an optimistic local one.
pub async fn handle_add_comment(msg: &AddCommentMessage, session: &CollabSession) {
    let Some(report_id) = session.state.registry.joined_room(session.conn_id) else {
        session.send_error(&CollabError::NotInRoom);
        return;
    };

    let row = match session
        .state
        .store
        .insert_comment(
            report_id,
            msg.section_id,
            &session.user.user_id,
            &msg.content,
            msg.parent_id,
        )
        .await
    {
        Ok(row) => row,
        Err(e) => {
            error!(
                "Failed to persist comment on section {}: {}",
                msg.section_id, e
            );
            session.send_error(&CollabError::Persistence(e.to_string()));
            return;
        }
    };

    let comment = CommentView {
        id: row.id,
        report_id: row.report,
        section_id: row.section,
        author_id: row.author,
        author_name: session.user.display_name.clone(),
        content: row.content,
        parent_id: row.parent,
        created_at: row.created_at.to_rfc3339(),
    };

    info!("Comment {} added to report {}", comment.id, report_id);
    session
        .state
        .registry
        .broadcast(report_id, None, &SendMessage::CommentAdded(comment));
}
