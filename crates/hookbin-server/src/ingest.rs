//! Request ingestion.
//!
//! Every capture path (live `/payload` traffic, pasted raw text and the
//! programmatic API) ends in [`IngestService::ingest`], which classifies the
//! request, resolves its addresses, stores it and publishes
//! `request.received` once the record is stored.

use std::sync::Arc;

use hookbin_core::{
    classify_binary, determine_client_ip, resolve_content_type, CapturedRequest, Event, Fanout,
    HeaderList,
};
use hookbin_storage::{Database, NewRequest, StorageError};
use tracing::{debug, info};

/// A request waiting to be stored.
#[derive(Debug, Clone)]
pub struct IngestRequest {
    pub session_id: String,
    pub token_id: String,
    pub method: String,
    /// Absolute URL or path+query, stored unchanged.
    pub url: String,
    pub headers: HeaderList,
    pub body: Vec<u8>,
    /// Socket peer address, or a placeholder when there is no socket.
    pub fallback_client_ip: String,
    pub override_client_ip: Option<String>,
    pub override_remote_ip: Option<String>,
}

/// Stores captured requests and announces them.
#[derive(Clone)]
pub struct IngestService {
    db: Arc<Database>,
    fanout: Fanout,
    trust_proxy: bool,
}

impl IngestService {
    pub fn new(db: Arc<Database>, fanout: Fanout, trust_proxy: bool) -> Self {
        Self {
            db,
            fanout,
            trust_proxy,
        }
    }

    /// Stores a request and publishes `request.received`.
    ///
    /// Storage errors are returned unchanged and nothing is published.
    pub fn ingest(&self, req: IngestRequest) -> Result<CapturedRequest, StorageError> {
        let content_type = resolve_content_type(&req.headers);
        let body = (!req.body.is_empty()).then_some(req.body.as_slice());
        // Classified against the resolved type, so a body without a declared
        // type counts as application/octet-stream.
        let is_binary = classify_binary(body, Some(&content_type));

        let client_ip = req
            .override_client_ip
            .unwrap_or_else(|| req.fallback_client_ip.clone());

        let remote_ip = match req.override_remote_ip {
            Some(ip) => ip,
            None => self
                .trust_proxy
                .then(|| determine_client_ip(&req.headers))
                .flatten()
                .unwrap_or_else(|| client_ip.clone()),
        };

        let new = NewRequest {
            session_id: req.session_id,
            token_id: req.token_id,
            method: req.method.to_uppercase(),
            url: req.url,
            headers: req.headers,
            content_type,
            is_binary,
            client_ip,
            remote_ip,
        };

        let record = self.db.create_request(new, &req.body)?;

        info!(
            token_id = %record.token_id,
            request_id = %record.id,
            method = %record.method,
            length = record.content_length,
            "Request captured"
        );

        let report = self
            .fanout
            .publish(&record.session_id, &Event::request_received(record.clone()));
        debug!(
            session_deliveries = report.session_deliveries,
            token_deliveries = report.token_deliveries,
            "request.received published"
        );

        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hookbin_core::{ChannelKind, Subscriber};
    use std::sync::Mutex;

    type Collected = Arc<Mutex<Vec<String>>>;

    fn setup(trust_proxy: bool) -> (IngestService, Arc<Database>, Fanout, String, String) {
        let db = Arc::new(Database::in_memory().unwrap());
        let fanout = Fanout::new();
        let session = db.create_session().unwrap();
        let token = db.create_token(&session.id).unwrap();
        let service = IngestService::new(db.clone(), fanout.clone(), trust_proxy);
        (service, db, fanout, session.id, token.id)
    }

    fn request(session_id: &str, token_id: &str, headers: HeaderList, body: &[u8]) -> IngestRequest {
        IngestRequest {
            session_id: session_id.to_string(),
            token_id: token_id.to_string(),
            method: "post".to_string(),
            url: "/payload/x?y=1".to_string(),
            headers,
            body: body.to_vec(),
            fallback_client_ip: "192.0.2.10".to_string(),
            override_client_ip: None,
            override_remote_ip: None,
        }
    }

    #[test]
    fn test_ingest_defaults() {
        let (service, db, _fanout, session, token) = setup(false);
        let record = service
            .ingest(request(&session, &token, HeaderList::new(), b""))
            .unwrap();

        assert_eq!(record.method, "POST");
        assert_eq!(record.url, "/payload/x?y=1");
        assert_eq!(record.content_type, "application/octet-stream");
        assert!(!record.is_binary);
        assert_eq!(record.content_length, 0);
        assert!(record.body_storage_ref.is_none());
        assert_eq!(record.client_ip, "192.0.2.10");
        assert_eq!(record.remote_ip, "192.0.2.10");
        assert_eq!(db.get_request(&record.id).unwrap().unwrap(), record);
    }

    #[test]
    fn test_undeclared_body_is_classified_as_octet_stream() {
        let (service, _db, _fanout, session, token) = setup(false);
        let record = service
            .ingest(request(&session, &token, HeaderList::new(), b"hello"))
            .unwrap();

        assert_eq!(record.content_type, "application/octet-stream");
        assert!(record.is_binary);
        assert_eq!(record.content_length, 5);
    }

    #[test]
    fn test_declared_text_body_is_not_binary() {
        let (service, _db, _fanout, session, token) = setup(false);
        let headers: HeaderList = [("content-type", "text/plain")].into_iter().collect();
        let record = service
            .ingest(request(&session, &token, headers, b"hello"))
            .unwrap();

        assert_eq!(record.content_type, "text/plain");
        assert!(!record.is_binary);
    }

    #[test]
    fn test_remote_ip_uses_proxy_headers_only_when_trusted() {
        let headers: HeaderList = [("X-Forwarded-For", "203.0.113.7, 10.0.0.1")]
            .into_iter()
            .collect();

        let (service, _db, _fanout, session, token) = setup(false);
        let record = service
            .ingest(request(&session, &token, headers.clone(), b""))
            .unwrap();
        assert_eq!(record.remote_ip, "192.0.2.10");

        let (service, _db, _fanout, session, token) = setup(true);
        let record = service
            .ingest(request(&session, &token, headers, b""))
            .unwrap();
        assert_eq!(record.client_ip, "192.0.2.10");
        assert_eq!(record.remote_ip, "203.0.113.7");
    }

    #[test]
    fn test_overrides_win() {
        let (service, _db, _fanout, session, token) = setup(true);
        let headers: HeaderList = [("X-Real-IP", "198.51.100.1")].into_iter().collect();
        let mut req = request(&session, &token, headers, b"");
        req.override_client_ip = Some("10.1.1.1".to_string());
        req.override_remote_ip = Some("10.2.2.2".to_string());

        let record = service.ingest(req).unwrap();
        assert_eq!(record.client_ip, "10.1.1.1");
        assert_eq!(record.remote_ip, "10.2.2.2");
    }

    #[test]
    fn test_publishes_after_storing() {
        let (service, db, fanout, session, token) = setup(false);

        let collected = Collected::default();
        let sink = collected.clone();
        let lookup_db = db.clone();
        let _sub = fanout.subscribe(
            ChannelKind::Token,
            &token,
            Subscriber::new("t", move |msg: &str| {
                let value: serde_json::Value = serde_json::from_str(msg).unwrap();
                let id = value["request"]["id"].as_str().unwrap();
                // The record must already be readable when the event arrives
                assert!(lookup_db.get_request(id).unwrap().is_some());
                sink.lock().unwrap().push(msg.to_string());
                Ok(())
            }),
        );

        let headers: HeaderList = [("Content-Type", "image/png")].into_iter().collect();
        let record = service
            .ingest(request(&session, &token, headers, &[0x41]))
            .unwrap();
        assert!(record.is_binary);

        let messages = collected.lock().unwrap().clone();
        assert_eq!(messages.len(), 1);
        let value: serde_json::Value = serde_json::from_str(&messages[0]).unwrap();
        assert_eq!(value["type"], "request.received");
        assert_eq!(value["token"], token.as_str());
    }

    #[test]
    fn test_storage_failure_publishes_nothing() {
        let (service, _db, fanout, session, _token) = setup(false);

        let collected = Collected::default();
        let sink = collected.clone();
        let _sub = fanout.subscribe(
            ChannelKind::Session,
            &session,
            Subscriber::new("s", move |msg: &str| {
                sink.lock().unwrap().push(msg.to_string());
                Ok(())
            }),
        );

        let result = service.ingest(request(&session, "missing-token", HeaderList::new(), b"x"));
        assert!(result.is_err());
        assert!(collected.lock().unwrap().clone().is_empty());
    }
}
