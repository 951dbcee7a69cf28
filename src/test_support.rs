#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};
use tokio::sync::Semaphore;
use uuid::Uuid;

use crate::db::store::{CommentRow, ReportStore, SectionRow, UserRow};
use crate::models::{AuthedUser, SendMessage};
use crate::state::AppState;
use crate::ws::connection::CollabSession;

/// In-memory `ReportStore` for handler tests: deterministic, no database,
/// with switches for write failures and stalled writes.
pub struct MemoryStore {
    users: Mutex<HashMap<String, UserRow>>,
    report_access: Mutex<HashSet<(String, Uuid)>>,
    sections: Mutex<HashMap<Uuid, SectionRow>>,
    versions: Mutex<HashMap<Uuid, Vec<(i32, serde_json::Value)>>>,
    comments: Mutex<Vec<CommentRow>>,
    fail_writes: AtomicBool,
    write_gate: Mutex<Option<Arc<Semaphore>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            users: Mutex::new(HashMap::new()),
            report_access: Mutex::new(HashSet::new()),
            sections: Mutex::new(HashMap::new()),
            versions: Mutex::new(HashMap::new()),
            comments: Mutex::new(Vec::new()),
            fail_writes: AtomicBool::new(false),
            write_gate: Mutex::new(None),
        }
    }

    pub fn add_user(&self, id: &str, org: &str, active: bool) {
        self.users.lock().unwrap().insert(
            id.to_string(),
            UserRow {
                id: id.to_string(),
                org: org.to_string(),
                display_name: format!("User {}", id),
                role: "editor".to_string(),
                active,
            },
        );
    }

    pub fn allow_access(&self, org: &str, report_id: Uuid) {
        self.report_access
            .lock()
            .unwrap()
            .insert((org.to_string(), report_id));
    }

    pub fn add_section(&self, report_id: Uuid, section_id: Uuid) {
        self.sections.lock().unwrap().insert(
            section_id,
            SectionRow {
                id: section_id,
                report: report_id,
                title: "Section".to_string(),
                content: serde_json::Value::Null,
                updated_at: Utc::now(),
                updated_by: String::new(),
            },
        );
    }

    /// Make every subsequent write fail.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Park content writes until permits are added to the returned semaphore.
    pub fn gate_writes(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.write_gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    pub fn section_content(&self, section_id: Uuid) -> Option<serde_json::Value> {
        let sections = self.sections.lock().unwrap();
        let content = &sections.get(&section_id)?.content;
        if content.is_null() {
            None
        } else {
            Some(content.clone())
        }
    }

    pub fn versions_for(&self, section_id: Uuid) -> Vec<i32> {
        self.versions
            .lock()
            .unwrap()
            .get(&section_id)
            .map(|entries| entries.iter().map(|(version, _)| *version).collect())
            .unwrap_or_default()
    }

    pub fn comment_count(&self) -> usize {
        self.comments.lock().unwrap().len()
    }

    async fn pass_gate(&self) {
        let gate = self.write_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            let permit = gate.acquire().await.expect("gate closed");
            permit.forget();
        }
    }

    fn check_writes(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            bail!("injected store failure");
        }
        Ok(())
    }
}

#[async_trait]
impl ReportStore for MemoryStore {
    async fn load_active_user(&self, user_id: &str) -> Result<Option<UserRow>> {
        Ok(self
            .users
            .lock()
            .unwrap()
            .get(user_id)
            .filter(|row| row.active)
            .cloned())
    }

    async fn load_users_by_ids(&self, user_ids: &[String]) -> Result<Vec<UserRow>> {
        let users = self.users.lock().unwrap();
        Ok(user_ids
            .iter()
            .filter_map(|uid| users.get(uid).filter(|row| row.active).cloned())
            .collect())
    }

    async fn org_has_report_access(&self, org: &str, report_id: Uuid) -> Result<bool> {
        Ok(self
            .report_access
            .lock()
            .unwrap()
            .contains(&(org.to_string(), report_id)))
    }

    async fn load_section(&self, report_id: Uuid, section_id: Uuid) -> Result<Option<SectionRow>> {
        Ok(self
            .sections
            .lock()
            .unwrap()
            .get(&section_id)
            .filter(|row| row.report == report_id)
            .cloned())
    }

    async fn update_section_content(
        &self,
        section_id: Uuid,
        content: &serde_json::Value,
        user_id: &str,
    ) -> Result<()> {
        self.pass_gate().await;
        self.check_writes()?;
        let mut sections = self.sections.lock().unwrap();
        if let Some(row) = sections.get_mut(&section_id) {
            row.content = content.clone();
            row.updated_at = Utc::now();
            row.updated_by = user_id.to_string();
        }
        Ok(())
    }

    async fn append_section_version(
        &self,
        _report_id: Uuid,
        section_id: Uuid,
        content: &serde_json::Value,
        _user_id: &str,
    ) -> Result<i32> {
        self.check_writes()?;
        let mut versions = self.versions.lock().unwrap();
        let entries = versions.entry(section_id).or_default();
        let version = entries.iter().map(|(v, _)| *v).max().unwrap_or(0) + 1;
        entries.push((version, content.clone()));
        Ok(version)
    }

    async fn insert_comment(
        &self,
        report_id: Uuid,
        section_id: Uuid,
        author_id: &str,
        content: &str,
        parent_id: Option<Uuid>,
    ) -> Result<CommentRow> {
        self.check_writes()?;
        let row = CommentRow {
            id: Uuid::new_v4(),
            report: report_id,
            section: section_id,
            author: author_id.to_string(),
            content: content.to_string(),
            parent: parent_id,
            created_at: Utc::now(),
        };
        self.comments.lock().unwrap().push(row.clone());
        Ok(row)
    }
}

pub fn state_with_store(store: Arc<MemoryStore>) -> Arc<AppState> {
    AppState::new(store)
}

/// Register a connection for `uid` in org-1 and return its session plus the
/// receiving end of its outbound channel.
pub fn connect(state: &Arc<AppState>, uid: &str) -> (CollabSession, UnboundedReceiver<String>) {
    connect_as(state, uid, "org-1")
}

pub fn connect_as(
    state: &Arc<AppState>,
    uid: &str,
    org: &str,
) -> (CollabSession, UnboundedReceiver<String>) {
    let conn_id = Uuid::new_v4();
    let (tx, rx) = unbounded_channel();
    let user = AuthedUser {
        user_id: uid.to_string(),
        organization_id: org.to_string(),
        display_name: format!("User {}", uid),
        role: "editor".to_string(),
    };
    state.registry.register(conn_id, user.clone(), tx.clone());
    (
        CollabSession::new(conn_id, user, state.clone(), tx),
        rx,
    )
}

/// Drain everything currently queued on a connection's outbound channel.
pub fn drain(rx: &mut UnboundedReceiver<String>) -> Vec<SendMessage> {
    let mut events = Vec::new();
    while let Ok(raw) = rx.try_recv() {
        events.push(serde_json::from_str(&raw).expect("well-formed outbound event"));
    }
    events
}

/// Await the next outbound event, bounded so a missing event fails the test
/// instead of hanging it.
pub async fn recv_timeout(rx: &mut UnboundedReceiver<String>) -> Option<SendMessage> {
    let raw = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .ok()??;
    Some(serde_json::from_str(&raw).expect("well-formed outbound event"))
}

/// Poll until a condition holds, bounded to a couple of seconds.
pub async fn wait_for(mut condition: impl FnMut() -> bool) {
    for _ in 0..400 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached within timeout");
}
