use std::sync::Arc;
use tracing::{error, info};

use crate::models::{
    CollabError, Collaborator, CollaboratorJoinedMessage, CollaboratorLeftMessage,
    CurrentCollaboratorsMessage, JoinReportMessage, LeaveReportMessage, SendMessage,
};
use crate::state::AppState;
use crate::ws::connection::CollabSession;
use crate::ws::presence::Departure;
use crate::ws::userctx;

/// Handle a join-report request: authorize, register membership, announce.
pub async fn handle_join_message(msg: &JoinReportMessage, session: &CollabSession) {
    let report_id = msg.report_id;

    // The access check runs before any state change, outside the registry lock.
    match session
        .state
        .store
        .org_has_report_access(&session.user.organization_id, report_id)
        .await
    {
        Ok(true) => {}
        Ok(false) => {
            info!(
                "User {} denied access to report {}",
                session.user.user_id, report_id
            );
            session.send_error(&CollabError::AccessDenied);
            return;
        }
        Err(e) => {
            error!("Access check failed for report {}: {}", report_id, e);
            session.send_error(&CollabError::Persistence(e.to_string()));
            return;
        }
    }

    let Some(outcome) = session.state.registry.join(session.conn_id, report_id) else {
        // The connection raced its own teardown; nothing to announce.
        return;
    };

    // Joining a new report implicitly leaves the previous one.
    if let Some(previous) = outcome.previous_room {
        announce_departure(&session.state, &previous);
    }

    // Member identities are resolved after the registry lock is released.
    let collaborators =
        match userctx::resolve_collaborators(&session.state.store, &outcome.member_ids).await {
            Ok(list) => list,
            Err(e) => {
                error!(
                    "Failed to resolve collaborators for report {}: {}",
                    report_id, e
                );
                vec![Collaborator::from(&session.user)]
            }
        };

    info!(
        "User {} joined report {} ({} member(s))",
        session.user.user_id,
        report_id,
        collaborators.len()
    );

    session.send(&SendMessage::CurrentCollaborators(
        CurrentCollaboratorsMessage {
            collaborators: collaborators.clone(),
        },
    ));

    if outcome.newly_joined {
        session.state.registry.broadcast(
            report_id,
            Some(session.conn_id),
            &SendMessage::CollaboratorJoined(CollaboratorJoinedMessage {
                user_id: session.user.user_id.clone(),
                user: Collaborator::from(&session.user),
                collaborators,
            }),
        );
    }
}

/// Handle an explicit leave-report request.
pub fn handle_leave_message(msg: &LeaveReportMessage, session: &CollabSession) {
    if let Some(departure) = session.state.registry.leave(session.conn_id, msg.report_id) {
        info!(
            "User {} left report {}",
            departure.user_id, departure.report_id
        );
        announce_departure(&session.state, &departure);
    }
}

/// Tell the remaining members a user is gone. Skipped while the user still
/// has another live connection in the room.
pub(crate) fn announce_departure(state: &Arc<AppState>, departure: &Departure) {
    if !departure.user_departed {
        return;
    }
    state.registry.broadcast(
        departure.report_id,
        None,
        &SendMessage::CollaboratorLeft(CollaboratorLeftMessage {
            user_id: departure.user_id.clone(),
            user_name: departure.user_name.clone(),
        }),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{connect, connect_as, drain, state_with_store, MemoryStore};
    use std::sync::Arc;
    use uuid::Uuid;

    #[tokio::test]
    async fn join_returns_members_and_notifies_peers_once() {
        let store = Arc::new(MemoryStore::new());
        store.add_user("join-alice", "org-1", true);
        store.add_user("join-bob", "org-1", true);
        let report = Uuid::new_v4();
        store.allow_access("org-1", report);
        let state = state_with_store(store);

        let (alice, mut alice_rx) = connect(&state, "join-alice");
        let (bob, mut bob_rx) = connect(&state, "join-bob");

        handle_join_message(&JoinReportMessage { report_id: report }, &alice).await;
        let events = drain(&mut alice_rx);
        assert_eq!(events.len(), 1);
        match &events[0] {
            SendMessage::CurrentCollaborators(current) => {
                assert_eq!(current.collaborators.len(), 1);
                assert_eq!(current.collaborators[0].user_id, "join-alice");
            }
            other => panic!("expected current-collaborators, got {:?}", other),
        }

        handle_join_message(&JoinReportMessage { report_id: report }, &bob).await;

        // Bob sees the full member list; Alice gets exactly one joined event.
        match &drain(&mut bob_rx)[0] {
            SendMessage::CurrentCollaborators(current) => {
                let ids: Vec<_> = current
                    .collaborators
                    .iter()
                    .map(|c| c.user_id.as_str())
                    .collect();
                assert_eq!(ids, vec!["join-alice", "join-bob"]);
            }
            other => panic!("expected current-collaborators, got {:?}", other),
        }
        let alice_events = drain(&mut alice_rx);
        assert_eq!(alice_events.len(), 1);
        match &alice_events[0] {
            SendMessage::CollaboratorJoined(joined) => {
                assert_eq!(joined.user_id, "join-bob");
                assert_eq!(joined.user.user_id, "join-bob");
                assert_eq!(joined.collaborators.len(), 2);
            }
            other => panic!("expected collaborator-joined, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn denied_join_changes_nothing_and_stays_private() {
        let store = Arc::new(MemoryStore::new());
        store.add_user("join-carol", "org-1", true);
        store.add_user("join-dave", "org-2", true);
        let report = Uuid::new_v4();
        store.allow_access("org-1", report);
        let state = state_with_store(store);

        let (carol, mut carol_rx) = connect(&state, "join-carol");
        let (dave, mut dave_rx) = connect_as(&state, "join-dave", "org-2");
        handle_join_message(&JoinReportMessage { report_id: report }, &carol).await;
        drain(&mut carol_rx);

        handle_join_message(&JoinReportMessage { report_id: report }, &dave).await;

        let dave_events = drain(&mut dave_rx);
        assert_eq!(dave_events.len(), 1);
        match &dave_events[0] {
            SendMessage::Error(err) => assert_eq!(err.message, "access denied to report"),
            other => panic!("expected error, got {:?}", other),
        }
        assert!(
            drain(&mut carol_rx).is_empty(),
            "authorization failures are never broadcast"
        );
        assert!(state.registry.joined_room(dave.conn_id).is_none());
    }

    #[tokio::test]
    async fn rejoin_refreshes_membership_without_reannouncing() {
        let store = Arc::new(MemoryStore::new());
        store.add_user("join-erin", "org-1", true);
        store.add_user("join-fred", "org-1", true);
        let report = Uuid::new_v4();
        store.allow_access("org-1", report);
        let state = state_with_store(store);

        let (erin, mut erin_rx) = connect(&state, "join-erin");
        let (fred, mut fred_rx) = connect(&state, "join-fred");
        handle_join_message(&JoinReportMessage { report_id: report }, &erin).await;
        handle_join_message(&JoinReportMessage { report_id: report }, &fred).await;
        drain(&mut erin_rx);
        drain(&mut fred_rx);

        handle_join_message(&JoinReportMessage { report_id: report }, &erin).await;

        let erin_events = drain(&mut erin_rx);
        assert_eq!(erin_events.len(), 1, "rejoin refreshes the member list");
        assert!(matches!(erin_events[0], SendMessage::CurrentCollaborators(_)));
        assert!(
            drain(&mut fred_rx).is_empty(),
            "no duplicate collaborator-joined on rejoin"
        );
    }

    #[tokio::test]
    async fn leave_deletes_empty_room_and_notifies_remainder() {
        let store = Arc::new(MemoryStore::new());
        store.add_user("join-gail", "org-1", true);
        store.add_user("join-hank", "org-1", true);
        let report = Uuid::new_v4();
        store.allow_access("org-1", report);
        let state = state_with_store(store);

        let (gail, mut gail_rx) = connect(&state, "join-gail");
        let (hank, mut hank_rx) = connect(&state, "join-hank");
        handle_join_message(&JoinReportMessage { report_id: report }, &gail).await;
        handle_join_message(&JoinReportMessage { report_id: report }, &hank).await;
        drain(&mut gail_rx);
        drain(&mut hank_rx);

        handle_leave_message(&LeaveReportMessage { report_id: report }, &gail);

        let hank_events = drain(&mut hank_rx);
        assert_eq!(hank_events.len(), 1);
        match &hank_events[0] {
            SendMessage::CollaboratorLeft(left) => assert_eq!(left.user_id, "join-gail"),
            other => panic!("expected collaborator-left, got {:?}", other),
        }

        handle_leave_message(&LeaveReportMessage { report_id: report }, &hank);
        assert_eq!(state.registry.counts().1, 0, "empty room is deleted");
    }
}
