//! A module that proxies network lookups to the host.

use modbridge_core::{Args, Method, ModuleInfo, Operation, RemoteError, Request, Resource};
use modbridge_rpc::{Marshaller, Module, RelayClient};
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    /// Networks fetched and logged when the module is enabled.
    #[serde(default)]
    pub watch_networks: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Status {
    pub name: String,
    pub enabled: bool,
    pub watch_networks: Vec<String>,
}

#[derive(Default)]
pub struct NetworkModule {
    name: OnceLock<String>,
    host: OnceLock<Marshaller<RelayClient>>,
    enabled: AtomicBool,
    settings: RwLock<Settings>,
}

impl NetworkModule {
    pub fn new() -> Self {
        Self::default()
    }

    fn host(&self) -> Result<&Marshaller<RelayClient>, RemoteError> {
        self.host
            .get()
            .ok_or_else(|| RemoteError::internal("host bridge not ready"))
    }

    async fn status(&self) -> Status {
        Status {
            name: self.name.get().cloned().unwrap_or_default(),
            enabled: self.enabled.load(Ordering::SeqCst),
            watch_networks: self.settings.read().await.watch_networks.clone(),
        }
    }
}

impl Module for NetworkModule {
    async fn init(&self, host: RelayClient, module_name: String) -> Result<(), RemoteError> {
        self.host
            .set(Marshaller::new(host))
            .map_err(|_| RemoteError::internal("already initialized"))?;
        let _ = self.name.set(module_name);
        tracing::info!("Bridged to host");
        Ok(())
    }

    async fn enable(&self) -> Result<(), RemoteError> {
        self.enabled.store(true, Ordering::SeqCst);
        let host = self.host()?;
        let watched = self.settings.read().await.watch_networks.clone();
        for uuid in watched {
            match host.get_network(&uuid, &Args::new()).await {
                Ok(network) => tracing::info!("Watching network {} ({})", network.uuid, network.name),
                Err(e) => tracing::warn!("Watched network {} unavailable: {}", uuid, e),
            }
        }
        tracing::info!("Enabled");
        Ok(())
    }

    async fn disable(&self) -> Result<(), RemoteError> {
        self.enabled.store(false, Ordering::SeqCst);
        tracing::info!("Disabled");
        Ok(())
    }

    async fn validate_and_set_config(&self, config: Vec<u8>) -> Result<Vec<u8>, RemoteError> {
        let settings: Settings = if config.is_empty() {
            Settings::default()
        } else {
            serde_json::from_slice(&config).map_err(|e| RemoteError::invalid(e.to_string()))?
        };
        if settings.watch_networks.iter().any(|uuid| uuid.is_empty()) {
            return Err(RemoteError::invalid("watch_networks entries must not be empty"));
        }
        let effective =
            serde_json::to_vec(&settings).map_err(|e| RemoteError::internal(e.to_string()))?;
        *self.settings.write().await = settings;
        Ok(effective)
    }

    fn info(&self) -> ModuleInfo {
        ModuleInfo {
            name: "network-module".into(),
            author: "modbridge".into(),
            website: "https://github.com/rhi-zone/modbridge".into(),
            license: "MIT".into(),
            has_network: true,
        }
    }

    async fn call(&self, request: Request) -> Result<Vec<u8>, RemoteError> {
        tracing::debug!(method = %request.method, path = %request.path, "Call");
        match Operation::route(request) {
            Operation::Get {
                resource: Resource::Networks,
                uuid,
                args,
            } => {
                let network = self
                    .host()?
                    .get_network(&uuid, &args)
                    .await
                    .map_err(RemoteError::from)?;
                to_json(&network)
            }
            Operation::Unknown(request)
                if request.method == Method::Get && request.path == "/api/status" =>
            {
                to_json(&self.status().await)
            }
            Operation::Unknown(request) => Err(RemoteError::not_found(format!(
                "no route for {} {}",
                request.method, request.path
            ))),
            _ => Err(RemoteError::unsupported("only network lookups are served")),
        }
    }
}

fn to_json<T: Serialize>(value: &T) -> Result<Vec<u8>, RemoteError> {
    serde_json::to_vec(value).map_err(|e| RemoteError::internal(e.to_string()))
}
