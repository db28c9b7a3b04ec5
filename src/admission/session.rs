use std::collections::HashMap;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadKind {
    Photo,
    Document,
}

impl UploadKind {
    pub fn as_str(self) -> &'static str {
        match self {
            UploadKind::Photo => "photo",
            UploadKind::Document => "document",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRecord {
    pub asset_reference: String,
    pub size_bytes: u64,
    pub created_at: Instant,
    pub kind: UploadKind,
}

impl SessionRecord {
    pub fn new(asset_reference: impl Into<String>, size_bytes: u64, kind: UploadKind) -> Self {
        Self {
            asset_reference: asset_reference.into(),
            size_bytes,
            created_at: Instant::now(),
            kind,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SessionSettings {
    /// `None` keeps a session until the next upload replaces it.
    pub ttl: Option<Duration>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionLookup {
    Active(SessionRecord),
    Expired,
    Absent,
}

/// Last upload per user.
#[derive(Debug, Default)]
pub struct SessionStore {
    settings: SessionSettings,
    sessions: HashMap<i64, SessionRecord>,
}

impl SessionStore {
    pub fn new(settings: SessionSettings) -> Self {
        Self {
            settings,
            sessions: HashMap::new(),
        }
    }

    /// Replaces whatever the user uploaded before.
    pub fn put(&mut self, user_id: i64, record: SessionRecord) {
        self.sessions.insert(user_id, record);
    }

    pub fn get(&self, user_id: i64) -> Option<&SessionRecord> {
        match self.sessions.get(&user_id) {
            Some(record) if !self.is_expired(record, Instant::now()) => Some(record),
            _ => None,
        }
    }

    /// Reads the session without consuming it. Expired sessions are reported
    /// as such and left in place until the next upload overwrites them.
    pub fn lookup_at(&self, user_id: i64, now: Instant) -> SessionLookup {
        match self.sessions.get(&user_id) {
            None => SessionLookup::Absent,
            Some(record) if self.is_expired(record, now) => SessionLookup::Expired,
            Some(record) => SessionLookup::Active(record.clone()),
        }
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    fn is_expired(&self, record: &SessionRecord, now: Instant) -> bool {
        self.settings
            .ttl
            .is_some_and(|ttl| now.saturating_duration_since(record.created_at) >= ttl)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_upload_overwrites_previous_session() {
        let mut store = SessionStore::default();
        store.put(1, SessionRecord::new("file-a", 100, UploadKind::Photo));
        store.put(1, SessionRecord::new("file-b", 200, UploadKind::Document));

        let record = store.get(1).unwrap();
        assert_eq!(record.asset_reference, "file-b");
        assert_eq!(record.size_bytes, 200);
        assert_eq!(record.kind, UploadKind::Document);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn reading_does_not_consume_the_session() {
        let mut store = SessionStore::default();
        store.put(3, SessionRecord::new("file-c", 1, UploadKind::Photo));
        assert!(store.get(3).is_some());
        assert!(store.get(3).is_some());
        assert!(store.get(4).is_none());
    }

    #[test]
    fn sessions_without_ttl_never_expire() {
        let mut store = SessionStore::default();
        let record = SessionRecord::new("file-d", 1, UploadKind::Photo);
        let created = record.created_at;
        store.put(5, record);

        let much_later = created + Duration::from_secs(60 * 60 * 24 * 30);
        assert!(matches!(
            store.lookup_at(5, much_later),
            SessionLookup::Active(_)
        ));
    }

    #[test]
    fn ttl_expires_stale_sessions() {
        let mut store = SessionStore::new(SessionSettings {
            ttl: Some(Duration::from_secs(600)),
        });
        let record = SessionRecord::new("file-e", 1, UploadKind::Photo);
        let created = record.created_at;
        store.put(6, record);

        assert!(matches!(
            store.lookup_at(6, created + Duration::from_secs(599)),
            SessionLookup::Active(_)
        ));
        assert_eq!(
            store.lookup_at(6, created + Duration::from_secs(600)),
            SessionLookup::Expired
        );
        assert_eq!(store.lookup_at(7, created), SessionLookup::Absent);
    }
}
