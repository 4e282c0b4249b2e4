//! Host and module talking through a real bridge.

use modbridge_core::model::Network;
use modbridge_core::{Args, ErrorKind, ModuleInfo, Operation, RemoteError, Request, Resource};
use modbridge_rpc::{
    BridgeError, CallHandler, Invoke, Listener, Marshaller, MemoryTransport, Module, ModuleClient,
    RelayClient, Transport, WsTransport, serve_listener,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Host data service: a fixed set of networks.
struct HostData {
    networks: HashMap<String, Network>,
}

impl HostData {
    fn new() -> Arc<Self> {
        let networks = [("host-net", "from the host")]
            .into_iter()
            .map(|(uuid, name)| {
                let network = Network {
                    uuid: uuid.into(),
                    name: name.into(),
                    ..Default::default()
                };
                (uuid.to_string(), network)
            })
            .collect();
        Arc::new(Self { networks })
    }
}

impl CallHandler for HostData {
    async fn call(&self, request: Request) -> Result<Vec<u8>, RemoteError> {
        match Operation::route(request) {
            Operation::Get {
                resource: Resource::Networks,
                uuid,
                ..
            } => {
                let network = self
                    .networks
                    .get(&uuid)
                    .ok_or_else(|| RemoteError::not_found("not found"))?;
                serde_json::to_vec(network).map_err(|e| RemoteError::internal(e.to_string()))
            }
            _ => Err(RemoteError::unsupported("unsupported")),
        }
    }
}

/// Module under test.
///
/// `GET /api/networks/abc-123` is answered locally, `/api/networks/slow-<ms>`
/// after a delay, and any other network uuid is looked up on the host.
#[derive(Default)]
struct NetModule {
    host: Mutex<Option<RelayClient>>,
}

impl NetModule {
    fn host(&self) -> Result<Marshaller<RelayClient>, RemoteError> {
        let host = self.host.lock().unwrap().clone();
        host.map(Marshaller::new)
            .ok_or_else(|| RemoteError::internal("not initialized"))
    }
}

impl Module for NetModule {
    async fn init(&self, host: RelayClient, module_name: String) -> Result<(), RemoteError> {
        if module_name == "misconfigured" {
            return Err(RemoteError::invalid("missing serial port"));
        }
        *self.host.lock().unwrap() = Some(host);
        Ok(())
    }

    async fn enable(&self) -> Result<(), RemoteError> {
        Ok(())
    }

    async fn disable(&self) -> Result<(), RemoteError> {
        Ok(())
    }

    async fn validate_and_set_config(&self, config: Vec<u8>) -> Result<Vec<u8>, RemoteError> {
        let value: serde_json::Value =
            serde_json::from_slice(&config).map_err(|e| RemoteError::invalid(e.to_string()))?;
        serde_json::to_vec(&value).map_err(|e| RemoteError::internal(e.to_string()))
    }

    fn info(&self) -> ModuleInfo {
        ModuleInfo {
            name: "net-module".into(),
            author: "tests".into(),
            website: String::new(),
            license: "MIT".into(),
            has_network: true,
        }
    }

    async fn call(&self, request: Request) -> Result<Vec<u8>, RemoteError> {
        match Operation::route(request) {
            Operation::Get {
                resource: Resource::Networks,
                uuid,
                ..
            } => {
                if uuid == "abc-123" {
                    return Ok(br#"{"uuid":"abc-123","name":"net1"}"#.to_vec());
                }
                if uuid == "missing" {
                    return Err(RemoteError::not_found("not found"));
                }
                if let Some(ms) = uuid.strip_prefix("slow-") {
                    let ms: u64 = ms.parse().map_err(|_| RemoteError::invalid("bad delay"))?;
                    tokio::time::sleep(Duration::from_millis(ms)).await;
                    return Ok(format!(r#"{{"uuid":"{uuid}","name":"slow"}}"#).into_bytes());
                }
                let network = self.host()?.get_network(&uuid, &Args::new()).await?;
                serde_json::to_vec(&network).map_err(|e| RemoteError::internal(e.to_string()))
            }
            _ => Err(RemoteError::not_found("unknown operation")),
        }
    }
}

async fn start<T: Transport>(transport: T, bind: &str) -> ModuleClient<T> {
    let listener = transport.listen(bind).await.unwrap();
    let addr = listener.local_addr().to_string();
    let module_transport = transport.clone();
    let broker_bind = bind.to_string();
    tokio::spawn(async move {
        serve_listener(NetModule::default(), module_transport, listener, &broker_bind)
            .await
            .unwrap();
    });
    ModuleClient::connect(transport, &addr, bind).await.unwrap()
}

async fn started_memory() -> ModuleClient<MemoryTransport> {
    let client = start(MemoryTransport::new(), "").await;
    client.init("net-module", HostData::new()).await.unwrap();
    client
}

#[tokio::test]
async fn host_facade_decodes_module_network() {
    let client = started_memory().await;
    let network = Marshaller::new(&client)
        .get_network("abc-123", &Args::new())
        .await
        .unwrap();
    assert_eq!(network.uuid, "abc-123");
    assert_eq!(network.name, "net1");
}

#[tokio::test]
async fn module_error_reaches_host_verbatim() {
    let client = started_memory().await;
    let result = Marshaller::new(&client)
        .get_network("missing", &Args::new())
        .await;
    match result {
        Err(BridgeError::Relay(e)) => assert_eq!(e.to_string(), "not found"),
        other => panic!("expected relay error, got {other:?}"),
    }
}

#[tokio::test]
async fn enable_before_init_is_a_violation() {
    let client = start(MemoryTransport::new(), "").await;
    assert!(matches!(
        client.enable().await,
        Err(BridgeError::ProtocolViolation(_))
    ));
    assert!(matches!(
        client.invoke(Request::default()).await,
        Err(BridgeError::ProtocolViolation(_))
    ));

    // The session survives the violation.
    client.init("net-module", HostData::new()).await.unwrap();
    client.enable().await.unwrap();
    client.disable().await.unwrap();
}

#[tokio::test]
async fn second_init_is_a_violation() {
    let client = started_memory().await;
    assert!(matches!(
        client.init("net-module", HostData::new()).await,
        Err(BridgeError::ProtocolViolation(_))
    ));
}

#[tokio::test]
async fn init_failure_keeps_the_module_error_kind() {
    let client = start(MemoryTransport::new(), "").await;
    match client.init("misconfigured", HostData::new()).await {
        Err(BridgeError::Init(remote)) => {
            assert_eq!(remote.kind, ErrorKind::Invalid);
            assert_eq!(remote.message, "missing serial port");
        }
        other => panic!("expected init error, got {other:?}"),
    }

    // Still unbridged, so a later init can succeed.
    client.init("net-module", HostData::new()).await.unwrap();
    client.enable().await.unwrap();
}

#[tokio::test]
async fn info_and_config_pass_through() {
    let client = start(MemoryTransport::new(), "").await;
    let info = client.info().await.unwrap();
    assert_eq!(info.name, "net-module");
    assert!(info.has_network);

    let normalized = client
        .validate_and_set_config(br#"{ "b": 1,   "a": [true] }"#.to_vec())
        .await
        .unwrap();
    assert_eq!(normalized, br#"{"a":[true],"b":1}"#);

    let err = client
        .validate_and_set_config(b"not json".to_vec())
        .await
        .unwrap_err();
    assert!(matches!(err, BridgeError::Relay(_)));
}

#[tokio::test]
async fn module_calls_back_into_the_host() {
    let client = started_memory().await;
    let marshaller = Marshaller::new(&client);

    let network = marshaller
        .get_network("host-net", &Args::new())
        .await
        .unwrap();
    assert_eq!(network.name, "from the host");

    // The host's "not found" travels host -> module -> host unchanged.
    let err = marshaller
        .get_network("nowhere", &Args::new())
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "not found");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_calls_in_both_directions() {
    let client = Arc::new(started_memory().await);
    let calls: Vec<_> = (0..50u64)
        .map(|i| {
            let client = client.clone();
            tokio::spawn(async move {
                let marshaller = Marshaller::new(client);
                let uuid = if i % 5 == 0 {
                    "host-net".to_string()
                } else {
                    format!("slow-{}", 50 - i)
                };
                let network = marshaller.get_network(&uuid, &Args::new()).await.unwrap();
                (uuid, network)
            })
        })
        .collect();
    for call in calls {
        let (uuid, network) = call.await.unwrap();
        assert_eq!(network.uuid, uuid);
    }
}

#[tokio::test]
async fn websocket_bridge_end_to_end() {
    let client = start(WsTransport, "127.0.0.1:0").await;
    client.init("net-module", HostData::new()).await.unwrap();
    client.enable().await.unwrap();

    let marshaller = Marshaller::new(&client);
    let local = marshaller.get_network("abc-123", &Args::new()).await.unwrap();
    assert_eq!(local.name, "net1");
    let bridged = marshaller.get_network("host-net", &Args::new()).await.unwrap();
    assert_eq!(bridged.name, "from the host");
}

#[tokio::test]
async fn unreachable_module_is_a_transport_error() {
    let result = ModuleClient::connect(MemoryTransport::new(), "mem-9", "").await;
    assert!(matches!(result, Err(BridgeError::Transport(_))));
}
