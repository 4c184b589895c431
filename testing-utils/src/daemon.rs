use std::{ops::Deref, sync::Mutex};

use httpmock::{Method::POST, Mock, MockServer};
use serde_json::json;

pub struct MockDaemon {
    server: MockServer,
    info_id: Mutex<Option<usize>>,
}

impl Deref for MockDaemon {
    type Target = MockServer;

    fn deref(&self) -> &MockServer {
        &self.server
    }
}

impl MockDaemon {
    pub async fn new_mock_daemon() -> MockDaemon {
        let mock_daemon = MockDaemon {
            server: MockServer::start_async().await,
            info_id: Mutex::new(None),
        };
        mock_daemon.mock_info(2_477_657, false);
        mock_daemon
    }

    fn replace_info_mock(&self) {
        // Use mock ID to delete old info mock.
        if let Some(id) = self
            .info_id
            .lock()
            .expect("PoisonError when reading daemon info mock ID")
            .take()
        {
            Mock::new(id, self).delete();
        };
    }

    pub fn mock_info(&self, height: u64, busy_syncing: bool) -> Mock {
        self.replace_info_mock();
        let mock = self.mock(|when, then| {
            when.method(POST)
                .path("/json_rpc")
                .body_contains(r#""method":"getinfo""#);
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({
                    "id": "0",
                    "jsonrpc": "2.0",
                    "result": {
                        "height": height,
                        "busy_syncing": busy_syncing,
                        "status": "OK",
                        "target_height": 0
                    }
                }));
        });
        *self
            .info_id
            .lock()
            .expect("PoisonError when writing daemon info mock ID") = Some(mock.id);
        mock
    }

    /// Answer `getinfo` with an HTTP error, as an overloaded proxy would.
    pub fn mock_unavailable(&self) -> Mock {
        self.replace_info_mock();
        let mock = self.mock(|when, then| {
            when.method(POST)
                .path("/json_rpc")
                .body_contains(r#""method":"getinfo""#);
            then.status(503);
        });
        *self
            .info_id
            .lock()
            .expect("PoisonError when writing daemon info mock ID") = Some(mock.id);
        mock
    }
}
