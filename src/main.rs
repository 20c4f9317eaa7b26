use anyhow::{Context, Result};
use log::{debug, info, warn};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;

use choreo_sync::animation::JsonAnimationSource;
use choreo_sync::config::Config;
use choreo_sync::osc::{self, Command, OscSink};
use choreo_sync::scorer::{LiveFrame, Session, SyncScorer};
use choreo_sync::skeleton::Topology;

const CONFIG_PATH: &str = "config.toml";

/// One connected performer, keyed by source address.
struct Performer {
    session: Session,
    sink: OscSink,
    last_seen: Instant,
}

struct Server {
    scorer: SyncScorer,
    source_topology: Topology,
    reply_socket: Arc<std::net::UdpSocket>,
    reply_addr: String,
    send_interval: Duration,
    idle_timeout: Duration,
    control: OscSink,
    performers: HashMap<SocketAddr, Performer>,
}

impl Server {
    fn handle(&mut self, addr: SocketAddr, msg: &rosc::OscMessage, now: Instant) {
        let command = match osc::parse_command(msg) {
            Ok(c) => c,
            Err(e) => {
                warn!("{addr}: {e}");
                return;
            }
        };

        match command {
            Command::Ping => {
                debug!("{addr}: ping");
                if let Err(e) = self.control.send_message(&osc::pong()) {
                    warn!("pong failed: {e}");
                }
            }
            Command::Level(id) => {
                // building a track is CPU-bound
                let result = tokio::task::block_in_place(|| self.scorer.load(&id));
                if let Err(e) = result {
                    warn!("{addr}: cannot load level {id}: {e}");
                }
            }
            Command::Data { marker, coords } => {
                let frame = match LiveFrame::from_flat(self.source_topology, &coords, marker) {
                    Ok(f) => f,
                    Err(e) => {
                        warn!("{addr}: {e}");
                        return;
                    }
                };
                let Self { scorer, reply_socket, reply_addr, send_interval, performers, .. } = self;
                let performer = performers.entry(addr).or_insert_with(|| {
                    info!("New performer {addr}");
                    Performer {
                        session: scorer.session(),
                        sink: OscSink::with_socket(Arc::clone(reply_socket), reply_addr, *send_interval),
                        last_seen: now,
                    }
                });
                performer.last_seen = now;
                if let Err(e) = performer.session.process(&frame, &mut performer.sink) {
                    warn!("{addr}: sending verdict failed: {e}");
                }
            }
        }
    }

    /// Drops sessions whose performer has been silent past the idle timeout.
    fn evict_idle(&mut self, now: Instant) {
        let timeout = self.idle_timeout;
        self.performers.retain(|addr, p| {
            let alive = now.saturating_duration_since(p.last_seen) < timeout;
            if !alive {
                info!("Performer {addr} idle, dropping session");
            }
            alive
        });
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::load_or_default(CONFIG_PATH)?;
    let scorer = config.build_scorer(Box::new(JsonAnimationSource))?;

    info!("choreo-sync {}", env!("CARGO_PKG_VERSION"));
    info!("Policy: {:?}, clock: {:?}", scorer.settings().policy, scorer.settings().clock);
    info!("Levels: {}", config.levels.len());

    let socket = UdpSocket::bind(&config.server.listen_addr)
        .await
        .with_context(|| format!("binding {}", config.server.listen_addr))?;
    let reply_socket = Arc::new(std::net::UdpSocket::bind("0.0.0.0:0")?);
    let send_interval = config.server.send_interval()?;
    let idle_timeout = config.server.idle_timeout()?;
    info!("Listening on {}, replying to {}", config.server.listen_addr, config.server.reply_addr);

    let mut server = Server {
        scorer,
        source_topology: config.skeleton.source,
        control: OscSink::with_socket(Arc::clone(&reply_socket), &config.server.reply_addr, Duration::ZERO),
        reply_socket,
        reply_addr: config.server.reply_addr.clone(),
        send_interval,
        idle_timeout,
        performers: HashMap::new(),
    };

    let mut buf = vec![0u8; rosc::decoder::MTU];
    let mut sweep = tokio::time::interval(idle_timeout);
    loop {
        tokio::select! {
            result = socket.recv_from(&mut buf) => {
                let (len, addr) = result?;
                match osc::decode_packet(&buf[..len]) {
                    Ok(messages) => {
                        for msg in &messages {
                            server.handle(addr, msg, Instant::now());
                        }
                    }
                    Err(e) => warn!("{addr}: undecodable packet: {e}"),
                }
            }
            _ = sweep.tick() => {
                server.evict_idle(Instant::now());
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down ({} performers)", server.performers.len());
                break;
            }
        }
    }

    Ok(())
}
