//! Per-boundary watcher for redirects, untrusted messages and destination
//! tampering.

use crate::boundary::DestinationRead;
use crate::boundary::IsolationBoundary;
use crate::timer::Interval;
use pp_core::PlaypenResult;
use pp_ipc::BoundaryMessage;
use pp_ipc::MessageBus;
use pp_ipc::Subscription;
use pp_security::ExpectedOrigin;
use pp_security::OriginAllowlist;
use pp_security::SandboxPolicy;
use std::time::Duration;
use std::time::Instant;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);
pub const DEFAULT_REDIRECT_THRESHOLD: u32 = 2;

/// Tunables for one monitor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorConfig {
    pub poll_interval: Duration,
    /// Restoration happens once the violation count exceeds this value.
    pub redirect_threshold: u32,
    pub expected_origin: Option<ExpectedOrigin>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            redirect_threshold: DEFAULT_REDIRECT_THRESHOLD,
            expected_origin: None,
        }
    }
}

/// Outcome of one destination check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedirectCheck {
    /// The destination could not be read across the boundary.
    Isolated,
    /// The destination could not be read for another reason.
    Unavailable,
    Unchanged,
    /// The destination changed to an authorized target.
    Navigated { destination: String },
    /// The destination changed to a target outside the expected origin.
    Suspicious { destination: String, attempts: u32 },
    /// Too many violations; the boundary was sent back.
    Restored { blocked: String, restored_to: String },
    /// Too many violations and no authorized destination to return to.
    NoSafeDestination { blocked: String },
}

/// Whether a cross-boundary message may be acted upon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageVerdict {
    Accepted,
    Rejected,
}

/// Operator counters for one monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MonitorStats {
    pub checks: u64,
    pub messages_accepted: u64,
    pub messages_rejected: u64,
    pub rewrites_blocked: u64,
    pub restorations: u64,
}

/// Work produced by one [`SecurityMonitor::poll`] call.
#[derive(Debug, Default)]
pub struct MonitorReport {
    pub redirect: Option<RedirectCheck>,
    /// Messages from trusted origins, in arrival order.
    pub accepted: Vec<BoundaryMessage>,
}

/// Watches exactly one isolation boundary. All detection state is private
/// to the instance.
#[derive(Debug)]
pub struct SecurityMonitor {
    config: MonitorConfig,
    allowlist: OriginAllowlist,
    policy: SandboxPolicy,
    interval: Interval,
    subscription: Option<Subscription>,
    last_known_destination: Option<String>,
    last_known_good: Option<String>,
    unauthorized_redirect_count: u32,
    stats: MonitorStats,
}

impl SecurityMonitor {
    /// Starts the polling interval and registers the message listener.
    pub fn attach(
        config: MonitorConfig,
        allowlist: OriginAllowlist,
        policy: SandboxPolicy,
        bus: &MessageBus,
        initial_destination: &str,
        now: Instant,
    ) -> PlaypenResult<Self> {
        let subscription = bus.subscribe()?;
        let interval = Interval::start(config.poll_interval, now);
        let authorized = config
            .expected_origin
            .as_ref()
            .is_none_or(|expected| expected.permits(initial_destination));

        Ok(Self {
            config,
            allowlist,
            policy,
            interval,
            subscription: Some(subscription),
            last_known_destination: Some(initial_destination.to_owned()),
            last_known_good: authorized.then(|| initial_destination.to_owned()),
            unauthorized_redirect_count: 0,
            stats: MonitorStats::default(),
        })
    }

    pub fn is_attached(&self) -> bool {
        self.subscription.is_some() || self.interval.is_active()
    }

    pub fn unauthorized_redirect_count(&self) -> u32 {
        self.unauthorized_redirect_count
    }

    pub fn last_known_destination(&self) -> Option<&str> {
        self.last_known_destination.as_deref()
    }

    pub fn stats(&self) -> MonitorStats {
        self.stats
    }

    /// Runs the destination check if the interval is due, then validates
    /// every queued message.
    pub fn poll(&mut self, now: Instant, boundary: &mut dyn IsolationBoundary) -> MonitorReport {
        let mut report = MonitorReport::default();
        if self.interval.poll(now) {
            report.redirect = Some(self.check_destination(boundary));
        }

        let queued = self
            .subscription
            .as_ref()
            .map(Subscription::drain)
            .unwrap_or_default();
        for message in queued {
            if self.validate_message(&message) == MessageVerdict::Accepted {
                report.accepted.push(message);
            }
        }

        report
    }

    /// Compares the boundary's destination with the last observation.
    pub fn check_destination(&mut self, boundary: &mut dyn IsolationBoundary) -> RedirectCheck {
        self.stats.checks = self.stats.checks.saturating_add(1);

        let current = match boundary.current_destination() {
            DestinationRead::Observed(current) => current,
            DestinationRead::Isolated => {
                tracing::trace!("boundary properly isolated");
                return RedirectCheck::Isolated;
            }
            DestinationRead::Unavailable(reason) => {
                tracing::debug!(%reason, "boundary destination unreadable");
                return RedirectCheck::Unavailable;
            }
        };

        let previous = self.last_known_destination.replace(current.clone());
        if previous.as_deref() == Some(current.as_str()) {
            return RedirectCheck::Unchanged;
        }

        tracing::info!(destination = %current, "boundary navigation detected");

        let Some(expected) = self.config.expected_origin.as_ref() else {
            self.last_known_good = Some(current.clone());
            return RedirectCheck::Navigated {
                destination: current,
            };
        };

        if expected.permits(&current) {
            self.unauthorized_redirect_count = 0;
            self.last_known_good = Some(current.clone());
            return RedirectCheck::Navigated {
                destination: current,
            };
        }

        self.unauthorized_redirect_count = self.unauthorized_redirect_count.saturating_add(1);
        tracing::warn!(
            destination = %current,
            expected = expected.as_str(),
            attempts = self.unauthorized_redirect_count,
            "boundary navigated outside its expected origin"
        );

        if self.unauthorized_redirect_count <= self.config.redirect_threshold {
            return RedirectCheck::Suspicious {
                destination: current,
                attempts: self.unauthorized_redirect_count,
            };
        }

        self.unauthorized_redirect_count = 0;
        let Some(good) = self.last_known_good.clone() else {
            tracing::error!(destination = %current, "suspicious redirect with no safe destination to restore");
            return RedirectCheck::NoSafeDestination { blocked: current };
        };

        tracing::error!(blocked = %current, restored_to = %good, "suspicious redirect blocked");
        boundary.navigate(&good);
        self.last_known_destination = Some(good.clone());
        self.stats.restorations = self.stats.restorations.saturating_add(1);
        RedirectCheck::Restored {
            blocked: current,
            restored_to: good,
        }
    }

    /// Checks `message` against the trusted origin allowlist.
    pub fn validate_message(&mut self, message: &BoundaryMessage) -> MessageVerdict {
        if self.allowlist.is_trusted(&message.origin) {
            self.stats.messages_accepted = self.stats.messages_accepted.saturating_add(1);
            tracing::debug!(origin = %message.origin, "received message from trusted origin");
            return MessageVerdict::Accepted;
        }

        self.stats.messages_rejected = self.stats.messages_rejected.saturating_add(1);
        tracing::warn!(origin = %message.origin, "blocked message from unauthorized origin");
        MessageVerdict::Rejected
    }

    /// Intercepts an out-of-band rewrite of the boundary's destination.
    ///
    /// Rewrites to disallowed schemes are refused before they reach the
    /// boundary; permitted rewrites to a new destination are logged.
    pub fn guard_rewrite(&mut self, value: &str) -> PlaypenResult<()> {
        if self.last_known_destination.as_deref() == Some(value) {
            return Ok(());
        }

        tracing::warn!(destination = %value, "out-of-band destination change attempt");
        if let Err(error) = self.policy.check_destination(value) {
            self.stats.rewrites_blocked = self.stats.rewrites_blocked.saturating_add(1);
            tracing::error!(destination = %value, %error, "blocked destination rewrite");
            return Err(error);
        }

        Ok(())
    }

    /// Cancels the interval and unregisters the message listener.
    pub fn release(&mut self) {
        self.interval.cancel();
        self.subscription = None;
    }
}
