use actix::{Actor, Context, Handler, Message, Recipient};
use serde::Serialize;
use std::collections::HashSet;

use crate::models::FileRecord;

/// Registry change event fanned out to every session, originator
/// included. No backlog: clients fetch current state on connect.
#[derive(Clone, Serialize, Debug)]
#[serde(tag = "type")]
pub enum FileEvent {
    #[serde(rename = "newFile")]
    Added { file: FileRecord },
    #[serde(rename = "fileDeleted")]
    Removed {
        #[serde(rename = "storageKey")]
        storage_key: String,
    },
}

/// Serialized event payload pushed to one session.
#[derive(Message)]
#[rtype(result = "()")]
pub struct Push(pub String);

/// Fan-out hub. The mailbox serializes subscribe/unsubscribe/publish,
/// so every listener observes publishes in the same global order.
#[derive(Default)]
pub struct Broadcaster {
    sessions: HashSet<Recipient<Push>>,
}

impl Broadcaster {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Actor for Broadcaster {
    type Context = Context<Self>;
}

#[derive(Message)]
#[rtype(result="()")]
pub struct Subscribe { pub addr: Recipient<Push> }

#[derive(Message)]
#[rtype(result="()")]
pub struct Unsubscribe { pub addr: Recipient<Push> }

#[derive(Message)]
#[rtype(result="()")]
pub struct Publish { pub event: FileEvent }

impl Handler<Subscribe> for Broadcaster {
    type Result = ();
    fn handle(&mut self, msg: Subscribe, _: &mut Context<Self>) {
        self.sessions.insert(msg.addr);
        log::debug!("session joined, {} connected", self.sessions.len());
    }
}
impl Handler<Unsubscribe> for Broadcaster {
    type Result = ();
    fn handle(&mut self, msg: Unsubscribe, _: &mut Context<Self>) {
        self.sessions.remove(&msg.addr);
        log::debug!("session left, {} connected", self.sessions.len());
    }
}
impl Handler<Publish> for Broadcaster {
    type Result = ();
    fn handle(&mut self, msg: Publish, _: &mut Context<Self>) {
        let payload = match serde_json::to_string(&msg.event) {
            Ok(p) => p,
            Err(e) => {
                log::error!("unserializable event {:?}: {e}", msg.event);
                return;
            }
        };
        // do_send never blocks; a slow session cannot delay the rest.
        for s in &self.sessions {
            s.do_send(Push(payload.clone()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    struct Collector {
        received: Arc<Mutex<Vec<String>>>,
    }
    impl Actor for Collector {
        type Context = Context<Self>;
    }
    impl Handler<Push> for Collector {
        type Result = ();
        fn handle(&mut self, msg: Push, _: &mut Context<Self>) {
            self.received.lock().unwrap().push(msg.0);
        }
    }

    fn collector() -> (actix::Addr<Collector>, Arc<Mutex<Vec<String>>>) {
        let received = Arc::new(Mutex::new(Vec::new()));
        let addr = Collector { received: received.clone() }.start();
        (addr, received)
    }

    fn sample_record(name: &str) -> FileRecord {
        FileRecord {
            storage_key: format!("{}.txt", uuid::Uuid::new_v4()),
            display_name: name.to_string(),
            size_bytes: 3,
            created_at: Utc::now(),
        }
    }

    #[actix_rt::test]
    async fn events_reach_existing_subscribers_in_publish_order_without_replay() {
        let hub = Broadcaster::new().start();
        let (early, early_rx) = collector();
        hub.do_send(Subscribe { addr: early.clone().recipient() });

        let record = sample_record("report.pdf");
        hub.do_send(Publish { event: FileEvent::Added { file: record.clone() } });

        let (late, late_rx) = collector();
        hub.do_send(Subscribe { addr: late.clone().recipient() });
        hub.do_send(Publish {
            event: FileEvent::Removed { storage_key: record.storage_key.clone() },
        });
        actix_rt::time::sleep(Duration::from_millis(50)).await;

        let early_seen = early_rx.lock().unwrap().clone();
        assert_eq!(early_seen.len(), 2);
        let first: serde_json::Value = serde_json::from_str(&early_seen[0]).unwrap();
        assert_eq!(first["type"], "newFile");
        assert_eq!(first["file"]["displayName"], "report.pdf");
        let second: serde_json::Value = serde_json::from_str(&early_seen[1]).unwrap();
        assert_eq!(second["type"], "fileDeleted");
        assert_eq!(second["storageKey"], record.storage_key);

        // the late joiner saw only the delete, never the earlier upload
        let late_seen = late_rx.lock().unwrap().clone();
        assert_eq!(late_seen.len(), 1);
        let only: serde_json::Value = serde_json::from_str(&late_seen[0]).unwrap();
        assert_eq!(only["type"], "fileDeleted");
    }

    #[actix_rt::test]
    async fn unsubscribe_is_idempotent_and_stops_delivery() {
        let hub = Broadcaster::new().start();
        let (addr, rx) = collector();
        hub.do_send(Subscribe { addr: addr.clone().recipient() });
        hub.do_send(Unsubscribe { addr: addr.clone().recipient() });
        hub.do_send(Unsubscribe { addr: addr.clone().recipient() });
        hub.do_send(Publish { event: FileEvent::Added { file: sample_record("a.txt") } });
        actix_rt::time::sleep(Duration::from_millis(50)).await;
        assert!(rx.lock().unwrap().is_empty());
    }

    #[actix_rt::test]
    async fn publish_with_no_subscribers_is_a_no_op() {
        let hub = Broadcaster::new().start();
        hub.do_send(Publish { event: FileEvent::Added { file: sample_record("b.txt") } });
        actix_rt::time::sleep(Duration::from_millis(20)).await;
        assert!(hub.connected());
    }
}
