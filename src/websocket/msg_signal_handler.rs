use crate::models::{
    CollabError, CursorMovedMessage, CursorUpdateMessage, SelectionChangedMessage,
    SelectionUpdateMessage, SendMessage, TypingMessage, UserStoppedTypingMessage,
    UserTypingMessage,
};
use crate::ws::connection::CollabSession;
use crate::ws::presence::CursorPosition;

// Cursor moves, selections, and typing signals are broadcast-only: never
// persisted, never acknowledged beyond delivery.

pub fn handle_cursor_update(msg: &CursorUpdateMessage, session: &CollabSession) {
    match session.state.registry.cursor_update(
        session.conn_id,
        msg.section_id,
        CursorPosition::Point(msg.position),
    ) {
        Ok((report_id, cursor)) => {
            session.state.registry.broadcast(
                report_id,
                Some(session.conn_id),
                &SendMessage::CursorMoved(CursorMovedMessage {
                    user_id: cursor.user_id,
                    user_name: cursor.user_name,
                    section_id: msg.section_id,
                    position: msg.position,
                    color: cursor.color,
                }),
            );
        }
        Err(e) => session.send_error(&e),
    }
}

pub fn handle_selection_update(msg: &SelectionUpdateMessage, session: &CollabSession) {
    match session.state.registry.cursor_update(
        session.conn_id,
        msg.section_id,
        CursorPosition::Range {
            start: msg.start,
            end: msg.end,
        },
    ) {
        Ok((report_id, cursor)) => {
            session.state.registry.broadcast(
                report_id,
                Some(session.conn_id),
                &SendMessage::SelectionChanged(SelectionChangedMessage {
                    user_id: cursor.user_id,
                    user_name: cursor.user_name,
                    section_id: msg.section_id,
                    start: msg.start,
                    end: msg.end,
                    color: cursor.color,
                }),
            );
        }
        Err(e) => session.send_error(&e),
    }
}

pub fn handle_typing_start(msg: &TypingMessage, session: &CollabSession) {
    let Some(report_id) = session.state.registry.joined_room(session.conn_id) else {
        session.send_error(&CollabError::NotInRoom);
        return;
    };
    session.state.registry.broadcast(
        report_id,
        Some(session.conn_id),
        &SendMessage::UserTyping(UserTypingMessage {
            user_id: session.user.user_id.clone(),
            user_name: session.user.display_name.clone(),
            section_id: msg.section_id,
        }),
    );
}

pub fn handle_typing_stop(msg: &TypingMessage, session: &CollabSession) {
    let Some(report_id) = session.state.registry.joined_room(session.conn_id) else {
        session.send_error(&CollabError::NotInRoom);
        return;
    };
    session.state.registry.broadcast(
        report_id,
        Some(session.conn_id),
        &SendMessage::UserStoppedTyping(UserStoppedTypingMessage {
            user_id: session.user.user_id.clone(),
            section_id: msg.section_id,
        }),
    );
}
