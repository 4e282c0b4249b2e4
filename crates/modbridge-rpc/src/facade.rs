//! Typed capability helpers over any [`Invoke`] relay.
//!
//! Each helper builds an [`Operation`], sends it as a generic call and decodes
//! the JSON result. New capabilities are new operations; the relay underneath
//! never changes.

use crate::BridgeError;
use crate::relay::Invoke;
use modbridge_core::model::{Device, Network, Point};
use modbridge_core::{Args, Operation, Resource};
use serde::Serialize;
use serde::de::DeserializeOwned;

pub struct Marshaller<I> {
    relay: I,
}

impl<I: Invoke> Marshaller<I> {
    pub fn new(relay: I) -> Self {
        Self { relay }
    }

    /// Send an operation and return the raw result.
    pub async fn perform(&self, op: Operation) -> Result<Vec<u8>, BridgeError> {
        self.relay.invoke(op.into_request()).await
    }

    pub async fn get<T: DeserializeOwned>(
        &self,
        resource: Resource,
        uuid: &str,
        args: &Args,
    ) -> Result<T, BridgeError> {
        let bytes = self
            .perform(Operation::Get {
                resource,
                uuid: uuid.to_string(),
                args: args.clone(),
            })
            .await?;
        decode(&bytes)
    }

    pub async fn list<T: DeserializeOwned>(
        &self,
        resource: Resource,
        args: &Args,
    ) -> Result<Vec<T>, BridgeError> {
        let bytes = self
            .perform(Operation::List {
                resource,
                args: args.clone(),
            })
            .await?;
        decode(&bytes)
    }

    pub async fn create<T: Serialize + DeserializeOwned>(
        &self,
        resource: Resource,
        body: &T,
    ) -> Result<T, BridgeError> {
        let bytes = self
            .perform(Operation::Create {
                resource,
                body: encode(body)?,
            })
            .await?;
        decode(&bytes)
    }

    pub async fn update<T: Serialize + DeserializeOwned>(
        &self,
        resource: Resource,
        uuid: &str,
        body: &T,
    ) -> Result<T, BridgeError> {
        let bytes = self
            .perform(Operation::Update {
                resource,
                uuid: uuid.to_string(),
                body: encode(body)?,
            })
            .await?;
        decode(&bytes)
    }

    /// Delete an entity. Whatever the peer returns is ignored.
    pub async fn delete(&self, resource: Resource, uuid: &str) -> Result<(), BridgeError> {
        self.perform(Operation::Delete {
            resource,
            uuid: uuid.to_string(),
        })
        .await
        .map(|_| ())
    }

    pub async fn get_network(&self, uuid: &str, args: &Args) -> Result<Network, BridgeError> {
        self.get(Resource::Networks, uuid, args).await
    }

    pub async fn get_networks(&self, args: &Args) -> Result<Vec<Network>, BridgeError> {
        self.list(Resource::Networks, args).await
    }

    pub async fn create_network(&self, network: &Network) -> Result<Network, BridgeError> {
        self.create(Resource::Networks, network).await
    }

    pub async fn update_network(
        &self,
        uuid: &str,
        network: &Network,
    ) -> Result<Network, BridgeError> {
        self.update(Resource::Networks, uuid, network).await
    }

    pub async fn delete_network(&self, uuid: &str) -> Result<(), BridgeError> {
        self.delete(Resource::Networks, uuid).await
    }

    pub async fn get_device(&self, uuid: &str, args: &Args) -> Result<Device, BridgeError> {
        self.get(Resource::Devices, uuid, args).await
    }

    pub async fn get_devices(&self, args: &Args) -> Result<Vec<Device>, BridgeError> {
        self.list(Resource::Devices, args).await
    }

    pub async fn get_point(&self, uuid: &str, args: &Args) -> Result<Point, BridgeError> {
        self.get(Resource::Points, uuid, args).await
    }

    pub async fn get_points(&self, args: &Args) -> Result<Vec<Point>, BridgeError> {
        self.list(Resource::Points, args).await
    }
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, BridgeError> {
    serde_json::from_slice(bytes).map_err(|e| BridgeError::Decode(e.to_string()))
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, BridgeError> {
    serde_json::to_vec(value).map_err(|e| BridgeError::Transport(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use modbridge_core::{Method, RemoteError, Request};
    use std::sync::Mutex;

    /// Records the last request and answers with a canned result.
    struct Canned {
        reply: Result<Vec<u8>, RemoteError>,
        seen: Mutex<Option<Request>>,
    }

    impl Canned {
        fn ok(bytes: &[u8]) -> Self {
            Self {
                reply: Ok(bytes.to_vec()),
                seen: Mutex::new(None),
            }
        }

        fn err(e: RemoteError) -> Self {
            Self {
                reply: Err(e),
                seen: Mutex::new(None),
            }
        }

        fn seen(&self) -> Request {
            self.seen.lock().unwrap().clone().unwrap()
        }
    }

    impl Invoke for Canned {
        async fn invoke(&self, request: Request) -> Result<Vec<u8>, BridgeError> {
            *self.seen.lock().unwrap() = Some(request);
            self.reply.clone().map_err(BridgeError::Relay)
        }
    }

    #[tokio::test]
    async fn get_network_fixes_verb_and_path() {
        let canned = Canned::ok(br#"{"uuid":"abc-123","name":"net1"}"#);
        let marshaller = Marshaller::new(&canned);
        let args = Args::new().with("with_devices", "true");

        let network = marshaller.get_network("abc-123", &args).await.unwrap();
        assert_eq!(network.uuid, "abc-123");
        assert_eq!(network.name, "net1");

        let request = canned.seen();
        assert_eq!(request.method, Method::Get);
        assert_eq!(request.path, "/api/networks/abc-123");
        assert_eq!(request.args, args);
        assert!(request.body.is_empty());
    }

    #[tokio::test]
    async fn wrong_shape_is_a_decode_error() {
        let canned = Canned::ok(b"[1,2,3]");
        let err = Marshaller::new(&canned)
            .get_network("abc-123", &Args::new())
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::Decode(_)));
    }

    #[tokio::test]
    async fn peer_error_is_passed_through() {
        let canned = Canned::err(RemoteError::not_found("not found"));
        let err = Marshaller::new(&canned)
            .get_point("missing", &Args::new())
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::Relay(_)));
        assert_eq!(err.to_string(), "not found");
    }

    #[tokio::test]
    async fn create_sends_json_body() {
        let canned = Canned::ok(br#"{"uuid":"n9","name":"new"}"#);
        let marshaller = Marshaller::new(&canned);
        let network = Network {
            name: "new".into(),
            ..Default::default()
        };
        let created = marshaller.create_network(&network).await.unwrap();
        assert_eq!(created.uuid, "n9");

        let request = canned.seen();
        assert_eq!(request.method, Method::Post);
        assert_eq!(request.path, "/api/networks");
        let sent: Network = serde_json::from_slice(&request.body).unwrap();
        assert_eq!(sent, network);
    }

    #[tokio::test]
    async fn delete_ignores_result_body() {
        let canned = Canned::ok(b"not json");
        Marshaller::new(&canned).delete_network("n1").await.unwrap();
        assert_eq!(canned.seen().method, Method::Delete);
        assert_eq!(canned.seen().path, "/api/networks/n1");
    }

    #[tokio::test]
    async fn list_decodes_arrays() {
        let canned = Canned::ok(br#"[{"uuid":"d1","network_uuid":"n1"},{"uuid":"d2"}]"#);
        let devices = Marshaller::new(&canned)
            .get_devices(&Args::new())
            .await
            .unwrap();
        assert_eq!(devices.len(), 2);
        assert_eq!(devices[0].network_uuid.as_deref(), Some("n1"));
        assert_eq!(canned.seen().path, "/api/devices");
    }
}
