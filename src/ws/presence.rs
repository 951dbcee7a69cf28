use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use tokio::sync::mpsc::UnboundedSender;
use uuid::Uuid;

use crate::models::{AuthedUser, CollabError, SendMessage};
use crate::utils::colors;

/// Opaque handle for one client connection.
pub type ConnId = Uuid;

/// Live cursor or selection of one room member. Never persisted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CursorState {
    pub user_id: String,
    pub user_name: String,
    pub section_id: Uuid,
    pub position: CursorPosition,
    pub color: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CursorPosition {
    Point(u32),
    Range { start: u32, end: u32 },
}

struct ConnectionEntry {
    user: AuthedUser,
    report_id: Option<Uuid>,
    tx: UnboundedSender<String>,
}

#[derive(Default)]
struct Room {
    /// connection -> user id; the member set is the distinct user ids.
    connections: HashMap<ConnId, String>,
}

impl Room {
    fn member_ids(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut ids = Vec::new();
        for uid in self.connections.values() {
            if seen.insert(uid.clone()) {
                ids.push(uid.clone());
            }
        }
        ids.sort();
        ids
    }

    fn has_user(&self, user_id: &str) -> bool {
        self.connections.values().any(|uid| uid == user_id)
    }
}

#[derive(Default)]
struct RegistryInner {
    connections: HashMap<ConnId, ConnectionEntry>,
    rooms: HashMap<Uuid, Room>,
    /// report -> user -> cursor
    cursors: HashMap<Uuid, HashMap<String, CursorState>>,
}

/// Result of adding a connection to a room.
#[derive(Debug)]
pub struct JoinOutcome {
    /// Set when the join implicitly left another room.
    pub previous_room: Option<Departure>,
    /// True when the user id newly appeared in the member set.
    pub newly_joined: bool,
    /// Distinct member user ids after the join.
    pub member_ids: Vec<String>,
}

/// Result of removing a connection from a room.
#[derive(Debug)]
pub struct Departure {
    pub report_id: Uuid,
    pub user_id: String,
    pub user_name: String,
    /// True when no other connection of the same user remains in the room,
    /// i.e. the user actually left the member set.
    pub user_departed: bool,
}

/// In-memory presence state: report -> member set, (report, user) -> cursor.
///
/// All mutations go through one mutex with short critical sections; the lock
/// is never held across an await point. Store I/O always happens outside it.
#[derive(Default)]
pub struct PresenceRegistry {
    inner: Mutex<RegistryInner>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // A poisoned lock only means another handler panicked mid-mutation;
    // the maps themselves are still structurally valid.
    fn lock(&self) -> MutexGuard<'_, RegistryInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Attach an authenticated connection. Must be called before any join.
    pub fn register(&self, conn_id: ConnId, user: AuthedUser, tx: UnboundedSender<String>) {
        let mut inner = self.lock();
        inner.connections.insert(
            conn_id,
            ConnectionEntry {
                user,
                report_id: None,
                tx,
            },
        );
    }

    /// Remove a connection entirely: implicit leave of its room plus cursor
    /// cleanup. Runs on every socket teardown path, clean or abrupt.
    pub fn unregister(&self, conn_id: ConnId) -> Option<Departure> {
        let mut inner = self.lock();
        let entry = inner.connections.remove(&conn_id)?;
        let report_id = entry.report_id?;
        Self::remove_from_room(&mut inner, conn_id, report_id, &entry.user)
    }

    /// Add the connection to a report room. The caller is responsible for the
    /// access check; no authorization happens here.
    pub fn join(&self, conn_id: ConnId, report_id: Uuid) -> Option<JoinOutcome> {
        let mut inner = self.lock();
        let (user, previous_report) = {
            let entry = inner.connections.get(&conn_id)?;
            (entry.user.clone(), entry.report_id)
        };

        // Rejoining the current room is a no-op beyond refreshing membership.
        if previous_report == Some(report_id) {
            let member_ids = inner
                .rooms
                .get(&report_id)
                .map(Room::member_ids)
                .unwrap_or_default();
            return Some(JoinOutcome {
                previous_room: None,
                newly_joined: false,
                member_ids,
            });
        }

        let previous_room = previous_report
            .and_then(|old| Self::remove_from_room(&mut inner, conn_id, old, &user));

        let room = inner.rooms.entry(report_id).or_default();
        let newly_joined = !room.has_user(&user.user_id);
        room.connections.insert(conn_id, user.user_id.clone());
        let member_ids = room.member_ids();

        if let Some(entry) = inner.connections.get_mut(&conn_id) {
            entry.report_id = Some(report_id);
        }

        Some(JoinOutcome {
            previous_room,
            newly_joined,
            member_ids,
        })
    }

    /// Explicit leave. No-op unless the connection is joined to that report.
    pub fn leave(&self, conn_id: ConnId, report_id: Uuid) -> Option<Departure> {
        let mut inner = self.lock();
        let user = {
            let entry = inner.connections.get(&conn_id)?;
            if entry.report_id != Some(report_id) {
                return None;
            }
            entry.user.clone()
        };
        let departure = Self::remove_from_room(&mut inner, conn_id, report_id, &user);
        if let Some(entry) = inner.connections.get_mut(&conn_id) {
            entry.report_id = None;
        }
        departure
    }

    /// The report room this connection is currently joined to, if any.
    pub fn joined_room(&self, conn_id: ConnId) -> Option<Uuid> {
        self.lock().connections.get(&conn_id)?.report_id
    }

    /// Record a cursor or selection for the connection's user and return the
    /// state to broadcast. Fails when the connection has no joined room.
    pub fn cursor_update(
        &self,
        conn_id: ConnId,
        section_id: Uuid,
        position: CursorPosition,
    ) -> Result<(Uuid, CursorState), CollabError> {
        let mut inner = self.lock();
        let (user, report_id) = {
            let entry = inner.connections.get(&conn_id).ok_or(CollabError::NotInRoom)?;
            let report_id = entry.report_id.ok_or(CollabError::NotInRoom)?;
            (entry.user.clone(), report_id)
        };
        let state = CursorState {
            user_id: user.user_id.clone(),
            user_name: user.display_name.clone(),
            section_id,
            position,
            color: colors::color_for_user(&user.user_id).to_string(),
        };
        inner
            .cursors
            .entry(report_id)
            .or_default()
            .insert(user.user_id, state.clone());
        Ok((report_id, state))
    }

    /// Fan an event out to every connection joined to the report, minus the
    /// optionally excluded sender. Senders are collected under the lock and
    /// written to outside of it.
    pub fn broadcast(&self, report_id: Uuid, exclude: Option<ConnId>, message: &SendMessage) {
        let payload = message.to_wire();
        let targets: Vec<UnboundedSender<String>> = {
            let inner = self.lock();
            let Some(room) = inner.rooms.get(&report_id) else {
                return;
            };
            room.connections
                .keys()
                .filter(|id| Some(**id) != exclude)
                .filter_map(|id| inner.connections.get(id).map(|entry| entry.tx.clone()))
                .collect()
        };
        for tx in targets {
            // A closed receiver just means that connection is tearing down;
            // it misses the event, which is acceptable for live fan-out.
            let _ = tx.send(payload.clone());
        }
    }

    /// Counts for the diagnostics endpoint:
    /// (connections, rooms, distinct members, cursors).
    pub fn counts(&self) -> (u32, u32, u32, u32) {
        let inner = self.lock();
        let members: HashSet<&String> = inner
            .rooms
            .values()
            .flat_map(|room| room.connections.values())
            .collect();
        let cursors: usize = inner.cursors.values().map(HashMap::len).sum();
        (
            inner.connections.len() as u32,
            inner.rooms.len() as u32,
            members.len() as u32,
            cursors as u32,
        )
    }

    /// Current cursor for a user in a report, if any. Test and diagnostics use.
    pub fn cursor_for(&self, report_id: Uuid, user_id: &str) -> Option<CursorState> {
        self.lock().cursors.get(&report_id)?.get(user_id).cloned()
    }

    fn remove_from_room(
        inner: &mut RegistryInner,
        conn_id: ConnId,
        report_id: Uuid,
        user: &AuthedUser,
    ) -> Option<Departure> {
        let room = inner.rooms.get_mut(&report_id)?;
        room.connections.remove(&conn_id)?;
        let user_departed = !room.has_user(&user.user_id);
        let room_empty = room.connections.is_empty();

        if user_departed {
            if let Some(cursors) = inner.cursors.get_mut(&report_id) {
                cursors.remove(&user.user_id);
                if cursors.is_empty() {
                    inner.cursors.remove(&report_id);
                }
            }
        }
        // No orphaned rooms: the entry disappears with its last connection.
        if room_empty {
            inner.rooms.remove(&report_id);
            inner.cursors.remove(&report_id);
        }

        Some(Departure {
            report_id,
            user_id: user.user_id.clone(),
            user_name: user.display_name.clone(),
            user_departed,
        })
    }
}
