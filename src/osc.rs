use log::debug;
use rosc::{decoder, encoder, OscMessage, OscPacket, OscType};
use std::net::UdpSocket;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::{Result, SyncError};
use crate::scorer::{FrameMarker, Verdict, VerdictSink};

pub const PING_ADDR: &str = "/ping";
pub const LEVEL_ADDR: &str = "/level";
pub const DATA_ADDR: &str = "/data";
pub const ANSWER_ADDR: &str = "/answer";
pub const RESULT_ADDR: &str = "/result";

/// Inbound request from a performer client.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Ping,
    /// Level id, name or index.
    Level(String),
    /// One frame: marker then packed `x, y, z` per joint.
    Data { marker: FrameMarker, coords: Vec<f32> },
}

/// Decodes a datagram; bundles are flattened into their messages.
pub fn decode_packet(buf: &[u8]) -> Result<Vec<OscMessage>> {
    let (_, packet) = decoder::decode_udp(buf)?;
    let mut messages = Vec::new();
    flatten(packet, &mut messages);
    Ok(messages)
}

fn flatten(packet: OscPacket, out: &mut Vec<OscMessage>) {
    match packet {
        OscPacket::Message(msg) => out.push(msg),
        OscPacket::Bundle(bundle) => {
            for p in bundle.content {
                flatten(p, out);
            }
        }
    }
}

fn as_f32(arg: &OscType) -> Option<f32> {
    match *arg {
        OscType::Float(v) => Some(v),
        OscType::Double(v) => Some(v as f32),
        OscType::Int(v) => Some(v as f32),
        OscType::Long(v) => Some(v as f32),
        _ => None,
    }
}

/// Float markers are timestamps in seconds, integer markers frame counters.
fn marker(arg: &OscType) -> Result<FrameMarker> {
    match *arg {
        OscType::Float(t) => Ok(FrameMarker::Timestamp(f64::from(t))),
        OscType::Double(t) => Ok(FrameMarker::Timestamp(t)),
        OscType::Int(c) if c >= 0 => Ok(FrameMarker::Counter(c as u64)),
        OscType::Long(c) if c >= 0 => Ok(FrameMarker::Counter(c as u64)),
        ref other => Err(SyncError::MalformedFrame(format!("bad frame marker {other:?}"))),
    }
}

pub fn parse_command(msg: &OscMessage) -> Result<Command> {
    match msg.addr.as_str() {
        PING_ADDR => Ok(Command::Ping),
        LEVEL_ADDR => match msg.args.first() {
            Some(OscType::Int(i)) => Ok(Command::Level(i.to_string())),
            Some(OscType::Long(i)) => Ok(Command::Level(i.to_string())),
            Some(OscType::String(s)) => Ok(Command::Level(s.clone())),
            other => Err(SyncError::Osc(format!("bad level argument {other:?}"))),
        },
        // `/data/<n>` variants carry the same payload
        addr if addr.starts_with(DATA_ADDR) => {
            let (first, rest) = msg
                .args
                .split_first()
                .ok_or_else(|| SyncError::MalformedFrame("empty /data message".into()))?;
            let coords = rest
                .iter()
                .enumerate()
                .map(|(i, a)| {
                    as_f32(a).ok_or_else(|| SyncError::MalformedFrame(format!("argument {} is {a:?}", i + 1)))
                })
                .collect::<Result<Vec<_>>>()?;
            Ok(Command::Data { marker: marker(first)?, coords })
        }
        other => Err(SyncError::Osc(format!("unknown address {other}"))),
    }
}

pub fn pong() -> OscMessage {
    OscMessage {
        addr: ANSWER_ADDR.to_string(),
        args: vec![OscType::String("pong".to_string())],
    }
}

/// `/result` carrying the verdict as JSON.
pub fn result_message(verdict: &Verdict) -> Result<OscMessage> {
    Ok(OscMessage {
        addr: RESULT_ADDR.to_string(),
        args: vec![OscType::String(verdict.to_json()?)],
    })
}

pub fn encode_message(msg: &OscMessage) -> Result<Vec<u8>> {
    let packet = OscPacket::Message(msg.clone());
    Ok(encoder::encode(&packet)?)
}

/// Sends verdicts to a fixed address, at most once per `interval`.
pub struct OscSink {
    socket: Arc<UdpSocket>,
    target_addr: String,
    interval: Duration,
    last_sent: Option<Instant>,
}

impl OscSink {
    pub fn new(target_addr: &str, interval: Duration) -> Result<Self> {
        let socket = UdpSocket::bind("0.0.0.0:0")?;
        Ok(Self::with_socket(Arc::new(socket), target_addr, interval))
    }

    pub fn with_socket(socket: Arc<UdpSocket>, target_addr: &str, interval: Duration) -> Self {
        Self {
            socket,
            target_addr: target_addr.to_string(),
            interval,
            last_sent: None,
        }
    }

    pub fn target_addr(&self) -> &str {
        &self.target_addr
    }

    pub fn send_message(&self, msg: &OscMessage) -> Result<()> {
        let data = encode_message(msg)?;
        self.socket.send_to(&data, &self.target_addr)?;
        Ok(())
    }
}

impl VerdictSink for OscSink {
    fn send(&mut self, verdict: &Verdict) -> Result<()> {
        let now = Instant::now();
        if let Some(last) = self.last_sent {
            if now.saturating_duration_since(last) < self.interval {
                debug!("throttled verdict");
                return Ok(());
            }
        }
        self.send_message(&result_message(verdict)?)?;
        self.last_sent = Some(now);
        Ok(())
    }
}
