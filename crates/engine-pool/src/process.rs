//! A single long-lived UCI engine process.

use std::collections::HashSet;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::time::{sleep_until, timeout, Instant};
use tracing::{debug, trace, warn};
use uci::{EngineCommand, EngineMessage, GoOptions};

use crate::search::SearchCollector;
use crate::{CancelToken, EngineConfig, EngineError, EngineEvaluation, SearchRequest};

/// Owns the pipes of one engine and drives it through the protocol.
///
/// Every exchange runs to completion (or to an explicit `stop`) before the
/// next one starts, so the engine is always idle between calls.
pub struct EngineProcess {
    id: usize,
    name: String,
    /// Option names advertised during the handshake, lowercased.
    advertised: HashSet<String>,
    child: Child,
    stdin: ChildStdin,
    lines: Lines<BufReader<ChildStdout>>,
    multipv: u32,
    ready_timeout: Duration,
    search_grace: Duration,
    max_search: Duration,
}

impl std::fmt::Debug for EngineProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineProcess")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("multipv", &self.multipv)
            .finish()
    }
}

impl EngineProcess {
    /// Start the engine and complete the handshake.
    ///
    /// Applies `Threads`, `Hash` and the extra options from `config`, then
    /// waits for `readyok`. The whole exchange is bounded by
    /// `config.handshake_timeout`.
    pub async fn spawn(id: usize, config: &EngineConfig) -> Result<Self, EngineError> {
        let mut child = Command::new(&config.path)
            .args(&config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| EngineError::Spawn {
                path: config.path.clone(),
                source,
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| EngineError::Handshake("stdin not captured".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| EngineError::Handshake("stdout not captured".to_string()))?;

        let mut engine = Self {
            id,
            name: String::new(),
            advertised: HashSet::new(),
            child,
            stdin,
            lines: BufReader::new(stdout).lines(),
            multipv: 1,
            ready_timeout: config.handshake_timeout,
            search_grace: config.search_grace,
            max_search: config.max_search,
        };

        match timeout(config.handshake_timeout, engine.handshake(config)).await {
            Ok(Ok(())) => {
                debug!(engine = id, name = %engine.name, "engine ready");
                Ok(engine)
            }
            Ok(Err(e)) => Err(match e {
                EngineError::Exited => EngineError::Handshake("engine exited".to_string()),
                other => other,
            }),
            Err(_) => Err(EngineError::Handshake(format!(
                "no uciok/readyok within {:?}",
                config.handshake_timeout
            ))),
        }
    }

    async fn handshake(&mut self, config: &EngineConfig) -> Result<(), EngineError> {
        self.send(&EngineCommand::Uci).await?;
        loop {
            match self.read_message().await? {
                EngineMessage::Id {
                    name: Some(name), ..
                } => self.name = name,
                EngineMessage::Option { name } => {
                    self.advertised.insert(name.to_ascii_lowercase());
                }
                EngineMessage::UciOk => break,
                _ => {}
            }
        }
        if self.name.is_empty() {
            self.name = "Unknown Engine".to_string();
        }

        self.send(&EngineCommand::set_option("Threads", config.threads)?)
            .await?;
        self.send(&EngineCommand::set_option("Hash", config.hash_mb)?)
            .await?;
        for (name, value) in &config.options {
            if !self.supports(name) {
                warn!(engine = self.id, option = %name, "engine does not advertise this option");
            }
            self.send(&EngineCommand::set_option(name, value)?).await?;
        }

        self.wait_ready().await
    }

    /// Pool-assigned slot number.
    pub fn id(&self) -> usize {
        self.id
    }

    /// Name reported via `id name`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the engine listed `option` during the handshake. An engine
    /// that lists no options at all is assumed to accept any.
    pub fn supports(&self, option: &str) -> bool {
        self.advertised.is_empty() || self.advertised.contains(&option.to_ascii_lowercase())
    }

    /// Run one search and return the final result.
    ///
    /// Cancelling `cancel` or running past `movetime + search_grace` sends
    /// `stop`; the engine is then drained to `bestmove` so it is idle again.
    /// A cancelled search returns [`EngineError::Cancelled`] and leaves the
    /// process reusable.
    pub async fn search(
        &mut self,
        request: &SearchRequest,
        cancel: &CancelToken,
    ) -> Result<EngineEvaluation, EngineError> {
        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }

        let lines = request.lines.max(1);
        if lines != self.multipv {
            self.send(&EngineCommand::set_option("MultiPV", lines)?)
                .await?;
            self.multipv = lines;
        }

        self.send(&request.position_command()).await?;
        self.send(&EngineCommand::Go(GoOptions::depth_and_time(
            request.depth,
            request.movetime_ms,
        )))
        .await?;

        let budget = if request.movetime_ms > 0 {
            Duration::from_millis(request.movetime_ms) + self.search_grace
        } else {
            self.max_search
        };
        let mut deadline = Instant::now() + budget;
        let mut collector = SearchCollector::new(lines);
        let mut stopping = false;
        let mut cancelled = false;

        let best_move = loop {
            let line = tokio::select! {
                biased;
                _ = cancel.cancelled(), if !stopping => {
                    debug!(engine = self.id, "search cancelled, stopping engine");
                    self.send(&EngineCommand::Stop).await?;
                    stopping = true;
                    cancelled = true;
                    deadline = Instant::now() + self.search_grace;
                    continue;
                }
                _ = sleep_until(deadline) => {
                    if stopping {
                        warn!(engine = self.id, "engine ignored stop");
                        return Err(EngineError::Timeout("stop"));
                    }
                    warn!(engine = self.id, ?budget, "search overran its budget, stopping engine");
                    self.send(&EngineCommand::Stop).await?;
                    stopping = true;
                    deadline = Instant::now() + self.search_grace;
                    continue;
                }
                line = self.lines.next_line() => line?,
            };

            let Some(line) = line else {
                return Err(EngineError::Exited);
            };
            match EngineMessage::parse(&line) {
                EngineMessage::Info(info) => collector.observe(info),
                EngineMessage::BestMove { mv, .. } => break mv,
                EngineMessage::Unknown(raw) => {
                    trace!(engine = self.id, line = %raw, "dropped unrecognised line")
                }
                _ => {}
            }
        };

        if cancelled {
            return Err(EngineError::Cancelled);
        }
        collector.finish(best_move)
    }

    /// Reset per-game state: `ucinewgame` followed by a ready check.
    pub async fn new_game(&mut self) -> Result<(), EngineError> {
        self.send(&EngineCommand::UciNewGame).await?;
        timeout(self.ready_timeout, self.wait_ready())
            .await
            .map_err(|_| EngineError::Timeout("new game"))?
    }

    /// Apply an option to the idle engine and wait until it is ready.
    pub async fn set_option(&mut self, name: &str, value: &str) -> Result<(), EngineError> {
        self.send(&EngineCommand::set_option(name, value)?).await?;
        if name.eq_ignore_ascii_case("MultiPV") {
            if let Ok(lines) = value.trim().parse() {
                self.multipv = lines;
            }
        }
        timeout(self.ready_timeout, self.wait_ready())
            .await
            .map_err(|_| EngineError::Timeout("setoption"))?
    }

    /// Ask the engine to exit, killing it if it does not.
    pub async fn quit(mut self) {
        let _ = self.send(&EngineCommand::Quit).await;
        match timeout(Duration::from_secs(1), self.child.wait()).await {
            Ok(_) => debug!(engine = self.id, "engine exited"),
            Err(_) => {
                warn!(engine = self.id, "engine did not quit, killing it");
                let _ = self.child.kill().await;
            }
        }
    }

    async fn wait_ready(&mut self) -> Result<(), EngineError> {
        self.send(&EngineCommand::IsReady).await?;
        loop {
            if let EngineMessage::ReadyOk = self.read_message().await? {
                return Ok(());
            }
        }
    }

    async fn send(&mut self, command: &EngineCommand) -> Result<(), EngineError> {
        let line = command.to_uci();
        trace!(engine = self.id, %line, "->");
        self.stdin.write_all(line.as_bytes()).await?;
        self.stdin.write_all(b"\n").await?;
        self.stdin.flush().await?;
        Ok(())
    }

    async fn read_message(&mut self) -> Result<EngineMessage, EngineError> {
        let line = self.lines.next_line().await?.ok_or(EngineError::Exited)?;
        trace!(engine = self.id, %line, "<-");
        Ok(EngineMessage::parse(&line))
    }
}
