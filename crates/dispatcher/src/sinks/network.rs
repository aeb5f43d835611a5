//! NetworkSink - UDP fire-and-forget streaming
//!
//! Records are encoded one by one and packed into datagrams of at most
//! `max_packet_size` bytes. JSON datagrams carry newline-delimited records;
//! bincode datagrams carry records prefixed with a little-endian `u32` length.

use contracts::{ContractError, LogBatch, LogSink};
use serde::Serialize;
use std::collections::HashMap;
use std::net::{SocketAddr, UdpSocket};
use tracing::{debug, error, instrument};

/// Serialization format for network transmission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NetworkFormat {
    /// JSON lines (human-readable, larger)
    #[default]
    Json,
    /// Length-prefixed bincode (binary, compact)
    Bincode,
}

/// Configuration for NetworkSink
#[derive(Debug, Clone)]
pub struct NetworkSinkConfig {
    /// Target address
    pub addr: SocketAddr,
    /// Serialization format
    pub format: NetworkFormat,
    /// Max datagram size (UDP typically 65507 for IPv4)
    pub max_packet_size: usize,
}

impl NetworkSinkConfig {
    /// Create config from params map
    pub fn from_params(params: &HashMap<String, String>) -> Result<Self, String> {
        let addr_str = params
            .get("addr")
            .ok_or_else(|| "missing 'addr' parameter".to_string())?;

        let addr: SocketAddr = addr_str
            .parse()
            .map_err(|e| format!("invalid address '{}': {}", addr_str, e))?;

        let format = match params.get("format").map(String::as_str) {
            Some("bincode") => NetworkFormat::Bincode,
            Some("json") | None => NetworkFormat::Json,
            Some(other) => return Err(format!("unknown format '{}'", other)),
        };

        let max_packet_size = params
            .get("max_packet_size")
            .and_then(|s| s.parse().ok())
            .unwrap_or(65000);

        Ok(Self {
            addr,
            format,
            max_packet_size,
        })
    }
}

/// Sink that sends batches over UDP
pub struct NetworkSink {
    name: String,
    config: NetworkSinkConfig,
    socket: UdpSocket,
}

impl NetworkSink {
    /// Create a new NetworkSink
    #[instrument(name = "network_sink_new", skip(name, config))]
    pub fn new(name: impl Into<String>, config: NetworkSinkConfig) -> std::io::Result<Self> {
        let name = name.into();
        // Bind to any available port
        let bind_addr = if config.addr.is_ipv4() {
            "0.0.0.0:0"
        } else {
            "[::]:0"
        };
        let socket = UdpSocket::bind(bind_addr)?;
        socket.connect(config.addr)?;

        debug!(
            sink = %name,
            target = %config.addr,
            "NetworkSink connected"
        );

        Ok(Self {
            name,
            config,
            socket,
        })
    }

    /// Create from params (for factory)
    #[instrument(name = "network_sink_from_params", skip(name, params))]
    pub fn from_params(
        name: impl Into<String>,
        params: &HashMap<String, String>,
    ) -> Result<Self, ContractError> {
        let name = name.into();
        let config = NetworkSinkConfig::from_params(params)
            .map_err(|e| ContractError::sink_connection(&name, e))?;

        Self::new(name.clone(), config)
            .map_err(|e| ContractError::sink_connection(&name, e.to_string()))
    }

    fn encode_record<T: Serialize>(&self, record: &T) -> Result<Vec<u8>, ContractError> {
        match self.config.format {
            NetworkFormat::Json => {
                let mut data = serde_json::to_vec(record)
                    .map_err(|e| ContractError::Serialization(format!("json error: {}", e)))?;
                data.push(b'\n');
                Ok(data)
            }
            NetworkFormat::Bincode => {
                let body = bincode::serialize(record)
                    .map_err(|e| ContractError::Serialization(format!("bincode error: {}", e)))?;
                let len = u32::try_from(body.len()).map_err(|_| {
                    ContractError::Serialization("record longer than u32::MAX".to_string())
                })?;
                let mut data = Vec::with_capacity(body.len() + 4);
                data.extend_from_slice(&len.to_le_bytes());
                data.extend_from_slice(&body);
                Ok(data)
            }
        }
    }

    /// Pack encoded records into datagrams
    fn pack<T: Serialize>(&self, records: &[T]) -> Result<Vec<Vec<u8>>, ContractError> {
        let max = self.config.max_packet_size;
        let mut packets = Vec::new();
        let mut current: Vec<u8> = Vec::new();

        for record in records {
            let data = self.encode_record(record)?;
            if data.len() > max {
                return Err(ContractError::sink_write(
                    &self.name,
                    format!(
                        "record of {} bytes exceeds max packet size {}",
                        data.len(),
                        max
                    ),
                ));
            }
            if !current.is_empty() && current.len() + data.len() > max {
                packets.push(std::mem::take(&mut current));
            }
            current.extend_from_slice(&data);
        }
        if !current.is_empty() {
            packets.push(current);
        }

        Ok(packets)
    }

    fn transmit(&self, packets: &[Vec<u8>]) -> Result<usize, ContractError> {
        let mut bytes = 0;
        for packet in packets {
            bytes += self.socket.send(packet).map_err(|e| {
                error!(sink = %self.name, error = %e, "UDP send failed");
                ContractError::sink_write(&self.name, e.to_string())
            })?;
        }
        Ok(bytes)
    }
}

impl LogSink for NetworkSink {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "network_sink_persist",
        skip(self, batch),
        fields(sink = %self.name, kind = %batch.kind(), records = batch.len())
    )]
    fn bulk_persist(&self, batch: &LogBatch) -> Result<(), ContractError> {
        let packets = match batch {
            LogBatch::Runner(records) => self.pack(records)?,
            LogBatch::Croner(records) => self.pack(records)?,
        };
        let bytes = self.transmit(&packets)?;
        debug!(sink = %self.name, packets = packets.len(), bytes, "Sent");
        Ok(())
    }
}
