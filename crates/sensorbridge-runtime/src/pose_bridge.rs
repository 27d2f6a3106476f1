//! [`PoseBridge`] – hardware poller plus `GET /pose`.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use sensorbridge_hal::TrackingSystem;
use sensorbridge_middleware::LatestSlot;
use sensorbridge_server::pose::{self, PoseState};
use sensorbridge_server::{DEFAULT_POSE_PORT, DEFAULT_SHUTDOWN_TIMEOUT, ServerHandle, http};
use sensorbridge_types::{BridgeError, PoseSample};
use tracing::{info, warn};

use crate::poller::{DEFAULT_POLL_INTERVAL, PollOutcome, PollerConfig, PollerHandle, TrackerPoller};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoseConfig {
    pub addr: SocketAddr,
    pub poll_interval: Duration,
    pub shutdown_timeout: Duration,
}

impl Default for PoseConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, DEFAULT_POSE_PORT)),
            poll_interval: DEFAULT_POLL_INTERVAL,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }
}

/// Running pose bridge.
///
/// The tracking system is moved onto the poller thread and never touched by
/// request handlers; they only read the pose slot.
pub struct PoseBridge {
    poses: Arc<LatestSlot<PoseSample>>,
    poller: PollerHandle,
    server: ServerHandle,
    shutdown_timeout: Duration,
}

impl PoseBridge {
    /// Bind the endpoint, then start polling `system`.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Bind`] if the address is unavailable; the
    /// tracking system is not initialised in that case.
    pub fn start<S>(config: PoseConfig, system: S) -> Result<Self, BridgeError>
    where
        S: TrackingSystem + 'static,
    {
        let backend = system.name().to_string();
        let poses = Arc::new(LatestSlot::new());
        let server = http::spawn(
            "pose",
            config.addr,
            pose::router(PoseState::new(Arc::clone(&poses))),
        )?;
        let poller = TrackerPoller::new(system, Arc::clone(&poses))
            .with_config(PollerConfig {
                interval: config.poll_interval,
                ..PollerConfig::default()
            })
            .spawn()?;
        info!(backend = %backend, addr = %server.local_addr(), "pose bridge started");
        Ok(Self {
            poses,
            poller,
            server,
            shutdown_timeout: config.shutdown_timeout,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.server.local_addr()
    }

    /// The sample the endpoint would serve right now.
    pub fn latest(&self) -> Option<PoseSample> {
        self.poses.peek()
    }

    /// `true` once polling has ended (no device, fault, or stop).
    pub fn poller_finished(&self) -> bool {
        self.poller.is_finished()
    }

    /// Stop polling, release the tracking session, then close the listener.
    ///
    /// The server is stopped even when the poller misses its deadline; the
    /// first error encountered is returned.
    pub fn stop(&mut self) -> Result<(), BridgeError> {
        let poller = self.poller.stop(self.shutdown_timeout);
        match &poller {
            Ok(PollOutcome::Stopped) => {}
            Ok(outcome) => warn!(?outcome, "poller had already ended"),
            Err(e) => warn!(error = %e, "poller shutdown was not clean"),
        }
        let server = self.server.stop(self.shutdown_timeout);
        poller.and(server)
    }
}
