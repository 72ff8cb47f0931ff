//! The relay orchestrator: one merged tool surface in front of the
//! backend connections, with fault consultation, risk scanning, and
//! event publication on every call.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::sync::mpsc;
use tracing::{info, warn};

use greenroom_bus::{EventBus, ObserverCommand};
use greenroom_chaos::{ChaosQueue, Intercept};
use greenroom_config::RelayConfig;
use greenroom_core::{
    is_injection_tool, silent_flag_set, strip_silent_flag, ProxyEvent, ProxyEventKind, RelayError,
    ToolCallResult, INJECTION_TOOL_PREFIX,
};
use greenroom_state::{StateEngine, StateError};
use greenroom_trust::{heuristic_report, ScenarioConfig};

use crate::connection::BackendConnection;
use crate::registry::ToolRegistry;
use crate::risk::RiskScanner;

fn state_err(err: StateError) -> RelayError {
    RelayError::State(err.to_string())
}

pub struct Relay {
    config: RelayConfig,
    state: Arc<StateEngine>,
    bus: Arc<EventBus>,
    chaos: Arc<ChaosQueue>,
    connections: HashMap<String, BackendConnection>,
    registry: ToolRegistry,
    scanner: RiskScanner,
    /// Injection tool names each backend reported over `internal/tools`.
    injection: HashMap<String, Vec<String>>,
}

impl Relay {
    /// Build a relay with no connections yet. `connect_backend` attaches
    /// each one; `start` does both for configured services.
    pub fn with_parts(config: RelayConfig, state: Arc<StateEngine>) -> Self {
        let bus = Arc::new(EventBus::new(config.retained_events));
        let scanner = RiskScanner::new(config.internal_domains.clone());
        Relay {
            config,
            state,
            bus,
            chaos: Arc::new(ChaosQueue::new()),
            connections: HashMap::new(),
            registry: ToolRegistry::new(),
            scanner,
            injection: HashMap::new(),
        }
    }

    /// Spawn every configured backend and run its handshake.
    pub async fn start(config: RelayConfig) -> Result<Self, RelayError> {
        let state = match &config.state_path {
            Some(path) => StateEngine::open(path),
            None => StateEngine::open_in_memory(),
        }
        .map_err(state_err)?;

        let services: Vec<_> = config
            .services
            .iter()
            .map(|(name, service)| (name.clone(), service.clone()))
            .collect();
        let state_path = config.state_path.clone();
        let mut relay = Relay::with_parts(config, Arc::new(state));
        for (name, service) in services {
            let conn = BackendConnection::spawn(&name, &service, state_path.as_deref())?;
            relay.connect_backend(conn).await?;
        }
        Ok(relay)
    }

    /// Handshake an attached connection and merge its catalogs.
    pub async fn connect_backend(&mut self, conn: BackendConnection) -> Result<(), RelayError> {
        let timeout = self.call_timeout();
        let service = conn.service().to_string();
        let tools = conn.handshake(timeout).await?;
        let injection = conn.injection_tools(timeout).await?;

        info!(
            service,
            tools = tools.len(),
            injection = injection.len(),
            "backend connected"
        );
        self.registry.register(&service, tools);
        self.injection.insert(
            service.clone(),
            injection.into_iter().map(|t| t.name).collect(),
        );
        self.connections.insert(service, conn);
        Ok(())
    }

    pub fn state(&self) -> &Arc<StateEngine> {
        &self.state
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn chaos(&self) -> &Arc<ChaosQueue> {
        &self.chaos
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.config.call_timeout_secs)
    }

    /// Forward one agent tool call per the relay contract: reserved-name
    /// rejection, fault consultation, bounded await, latency padding,
    /// and the second-layer risk scan. The silent flag suppresses
    /// call/response events and padding but never the scan.
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: Option<HashMap<String, serde_json::Value>>,
    ) -> Result<ToolCallResult, RelayError> {
        if is_injection_tool(name) {
            // Indistinguishable from an unknown tool so the agent cannot
            // probe for internal names.
            warn!(tool = name, "agent requested a reserved injection tool");
            return Err(RelayError::ReservedTool(name.to_string()));
        }

        let mut args = arguments.unwrap_or_default();
        let silent = silent_flag_set(&args);
        strip_silent_flag(&mut args);

        let service = self
            .registry
            .service_for(name)
            .ok_or_else(|| RelayError::UnknownTool(name.to_string()))?
            .to_string();
        let conn = self
            .connections
            .get(&service)
            .filter(|conn| conn.is_open())
            .ok_or_else(|| RelayError::ServiceUnavailable(service.clone()))?;

        let args_map: serde_json::Map<String, serde_json::Value> =
            args.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        let args_value = serde_json::Value::Object(args_map.clone());

        let call_id = self
            .state
            .record_tool_call(&service, name, &args_value)
            .map_err(state_err)?;
        if !silent {
            self.bus.publish(ProxyEvent::new(
                ProxyEventKind::ToolCall,
                serde_json::json!({
                    "call_id": call_id,
                    "service": service,
                    "tool": name,
                    "arguments": args_value,
                }),
            ));
        }

        let started = std::time::Instant::now();
        let mut intercepted = false;
        let forwarded = match self.chaos.take_next() {
            Some(effect) => match effect.apply(&service, name, &args_value) {
                Intercept::Delay(delay) => {
                    info!(tool = name, ?delay, "latency fault consumed");
                    tokio::time::sleep(delay).await;
                    self.forward(conn, &service, name, &args).await
                }
                Intercept::Respond(result) => {
                    info!(tool = name, "fault short-circuited call");
                    intercepted = true;
                    Ok(result)
                }
                Intercept::RespondWithFollowup(result, followup) => {
                    info!(tool = name, "fault short-circuited call with followup");
                    intercepted = true;
                    let bus = Arc::clone(&self.bus);
                    tokio::spawn(async move {
                        tokio::time::sleep(followup.delay()).await;
                        bus.publish(followup.into_event());
                    });
                    Ok(result)
                }
            },
            None => self.forward(conn, &service, name, &args).await,
        };

        // A failed forward still consumed the agent's request: the call
        // record closes with the error and the arguments are scanned, so
        // a stalled backend cannot swallow the audit trail.
        let result = match forwarded {
            Ok(result) => result,
            Err(err) => {
                let duration_ms = started.elapsed().as_millis() as i64;
                let envelope = ToolCallResult::error(err.to_string());
                self.state
                    .complete_tool_call(call_id, &serde_json::to_value(&envelope)?, duration_ms)
                    .map_err(state_err)?;
                self.scan_and_record(&service, name, &args_map, "")?;
                return Err(err);
            }
        };

        if !silent && !intercepted {
            self.latency_padding().await;
        }

        let duration_ms = started.elapsed().as_millis() as i64;
        self.state
            .complete_tool_call(call_id, &serde_json::to_value(&result)?, duration_ms)
            .map_err(state_err)?;

        // Risk scanning runs on every call, silent or intercepted alike.
        self.scan_and_record(&service, name, &args_map, &result.text_content())?;

        if !silent {
            self.bus.publish(ProxyEvent::new(
                ProxyEventKind::ToolResponse,
                serde_json::json!({
                    "call_id": call_id,
                    "service": service,
                    "tool": name,
                    "result": serde_json::to_value(&result)?,
                    "duration_ms": duration_ms,
                }),
            ));
        }

        Ok(result)
    }

    fn scan_and_record(
        &self,
        service: &str,
        tool: &str,
        args: &serde_json::Map<String, serde_json::Value>,
        response_text: &str,
    ) -> Result<(), RelayError> {
        for event in self.scanner.scan(service, tool, args, response_text) {
            self.state.log_event(&event).map_err(state_err)?;
            self.bus.publish(ProxyEvent::new(
                ProxyEventKind::RiskEvent,
                serde_json::to_value(&event)?,
            ));
        }
        Ok(())
    }

    async fn forward(
        &self,
        conn: &BackendConnection,
        service: &str,
        name: &str,
        args: &HashMap<String, serde_json::Value>,
    ) -> Result<ToolCallResult, RelayError> {
        let params = serde_json::json!({"name": name, "arguments": args});
        let response = conn
            .request("tools/call", Some(params), self.call_timeout())
            .await?;
        if let Some(error) = response.error {
            return Err(RelayError::Backend {
                service: service.to_string(),
                code: error.code,
                message: error.message,
            });
        }
        let result = response
            .result
            .ok_or_else(|| RelayError::Protocol(format!("empty tools/call result from '{}'", service)))?;
        Ok(serde_json::from_value(result)?)
    }

    /// Randomized delay so successful calls feel like a real API.
    async fn latency_padding(&self) {
        let (floor, ceiling) = (self.config.latency_floor_ms, self.config.latency_ceiling_ms);
        let ms = if floor == ceiling {
            floor
        } else {
            rand::thread_rng().gen_range(floor..=ceiling)
        };
        if ms > 0 {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
    }

    /// Apply one observer command.
    pub async fn handle_observer_command(&self, command: ObserverCommand) -> Result<(), RelayError> {
        match command {
            ObserverCommand::InjectChaos { effect } => {
                self.bus.publish(ProxyEvent::new(
                    ProxyEventKind::ChaosInjected,
                    serde_json::json!({
                        "label": effect.label(),
                        "effect": serde_json::to_value(&effect)?,
                    }),
                ));
                self.chaos.push(effect);
                Ok(())
            }
            ObserverCommand::InjectMessage {
                service,
                sender,
                recipient,
                body,
            } => {
                self.inject(
                    &service,
                    serde_json::json!({"sender": sender, "recipient": recipient, "body": body}),
                    "message injected",
                )
                .await
            }
            ObserverCommand::InjectEmail {
                service,
                from,
                to,
                subject,
                body,
            } => {
                self.inject(
                    &service,
                    serde_json::json!({
                        "sender": from,
                        "recipient": to,
                        "subject": subject,
                        "body": body,
                    }),
                    "email injected",
                )
                .await
            }
            ObserverCommand::InjectTransaction {
                service,
                amount,
                description,
                counterparty,
            } => {
                self.inject(
                    &service,
                    serde_json::json!({
                        "amount": amount,
                        "description": description,
                        "counterparty": counterparty,
                    }),
                    "transaction injected",
                )
                .await
            }
        }
    }

    /// Invoke a backend's hidden injection tool. Bypasses the registry,
    /// the fault queue, and call/response logging; the only trace on the
    /// bus is a status broadcast.
    async fn inject(
        &self,
        service: &str,
        args: serde_json::Value,
        status: &str,
    ) -> Result<(), RelayError> {
        let conn = self
            .connections
            .get(service)
            .filter(|conn| conn.is_open())
            .ok_or_else(|| RelayError::ServiceUnavailable(service.to_string()))?;
        let tool = format!("{}{}", INJECTION_TOOL_PREFIX, service);
        let advertised = self
            .injection
            .get(service)
            .map(|tools| tools.iter().any(|t| t == &tool))
            .unwrap_or(false);
        if !advertised {
            warn!(service, "backend has no injection tool; command dropped");
            return Err(RelayError::UnknownTool(tool));
        }

        let params = serde_json::json!({"name": tool, "arguments": args});
        let response = conn
            .request("tools/call", Some(params), self.call_timeout())
            .await?;
        if let Some(error) = response.error {
            return Err(RelayError::Backend {
                service: service.to_string(),
                code: error.code,
                message: error.message,
            });
        }

        self.bus.publish(ProxyEvent::new(
            ProxyEventKind::Status,
            serde_json::json!({"service": service, "message": status}),
        ));
        Ok(())
    }

    /// Score the run and broadcast the report: the scenario path when
    /// one is configured, the severity-count heuristic otherwise.
    pub fn evaluate(
        &self,
        scenario: Option<&ScenarioConfig>,
    ) -> Result<serde_json::Value, RelayError> {
        let report = match scenario {
            Some(scenario) => {
                serde_json::to_value(scenario.evaluate(&self.state).map_err(state_err)?)?
            }
            None => {
                let events = self.state.risk_events().map_err(state_err)?;
                serde_json::to_value(heuristic_report(&events))?
            }
        };
        self.bus
            .publish(ProxyEvent::new(ProxyEventKind::Report, report.clone()));
        Ok(report)
    }
}

/// Drain observer commands into the relay. Spawned alongside the
/// observer listener; exits when the channel closes.
pub async fn run_observer_commands(relay: Arc<Relay>, mut commands: mpsc::Receiver<ObserverCommand>) {
    while let Some(command) = commands.recv().await {
        if let Err(err) = relay.handle_observer_command(command).await {
            warn!(error = %err, "observer command failed");
        }
    }
}
