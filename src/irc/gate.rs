//! Join gate: keeps application traffic off the wire until the session is
//! registered with the server and every configured channel has been joined.
//!
//! The session moves through [`Phase`] values in one direction only. Waiters
//! are woken through a `watch` channel instead of polling.

use std::fmt;

use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Phase {
    /// Handshake sent, waiting for the server to confirm our identity.
    Registering,
    /// Confirmation received; JOIN lines may now be sent.
    Registered,
    /// JOIN sent for every configured channel. Application traffic flows.
    Joined,
    /// Disconnected, by request or after a fatal error.
    Terminated,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Registering => "registering",
            Phase::Registered => "registered",
            Phase::Joined => "joined",
            Phase::Terminated => "terminated",
        };
        f.write_str(s)
    }
}

#[derive(Debug)]
pub struct JoinGate {
    phase: watch::Sender<Phase>,
}

impl JoinGate {
    pub fn new() -> Self {
        let (phase, _) = watch::channel(Phase::Registering);
        Self { phase }
    }

    pub fn phase(&self) -> Phase {
        *self.phase.borrow()
    }

    /// Whether application messages may be sent right now.
    pub fn is_open(&self) -> bool {
        self.phase() == Phase::Joined
    }

    /// Record the server's confirmation. Returns `true` only for the call
    /// that actually moved the session out of [`Phase::Registering`].
    pub fn mark_registered(&self) -> bool {
        self.advance(Phase::Registering, Phase::Registered)
    }

    /// Open the gate once the JOIN lines have been queued.
    pub fn mark_joined(&self) -> bool {
        self.advance(Phase::Registered, Phase::Joined)
    }

    /// Move to [`Phase::Terminated`] from any live phase. Returns `false` if
    /// the session was already terminated.
    pub fn terminate(&self) -> bool {
        self.phase.send_if_modified(|phase| {
            if *phase == Phase::Terminated {
                return false;
            }
            *phase = Phase::Terminated;
            true
        })
    }

    /// Resolve once the session reaches `target` or terminates, returning the
    /// phase actually observed.
    pub async fn wait_for(&self, target: Phase) -> Phase {
        let mut rx = self.phase.subscribe();
        // The sender lives in `self`, so the channel cannot close under us.
        let seen = match rx
            .wait_for(|p| *p >= target || *p == Phase::Terminated)
            .await
        {
            Ok(phase) => *phase,
            Err(_) => Phase::Terminated,
        };
        seen
    }

    pub async fn terminated(&self) {
        self.wait_for(Phase::Terminated).await;
    }

    fn advance(&self, from: Phase, to: Phase) -> bool {
        self.phase.send_if_modified(|phase| {
            if *phase != from {
                return false;
            }
            *phase = to;
            true
        })
    }
}

impl Default for JoinGate {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_phases_only_advance() {
        let gate = JoinGate::new();
        assert_eq!(gate.phase(), Phase::Registering);
        assert!(!gate.is_open());

        assert!(!gate.mark_joined());
        assert!(gate.mark_registered());
        assert!(!gate.mark_registered());
        assert!(!gate.is_open());

        assert!(gate.mark_joined());
        assert!(gate.is_open());

        assert!(gate.terminate());
        assert!(!gate.terminate());
        assert!(!gate.is_open());
        assert!(!gate.mark_registered());
        assert_eq!(gate.phase(), Phase::Terminated);
    }

    #[tokio::test]
    async fn test_wait_for_wakes_on_signal() {
        let gate = Arc::new(JoinGate::new());
        let waiter = {
            let gate = gate.clone();
            tokio::spawn(async move { gate.wait_for(Phase::Registered).await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!waiter.is_finished());

        gate.mark_registered();
        let seen = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(seen, Phase::Registered);
    }

    #[tokio::test]
    async fn test_wait_for_returns_when_already_reached() {
        let gate = JoinGate::new();
        gate.mark_registered();
        gate.mark_joined();
        assert_eq!(gate.wait_for(Phase::Registered).await, Phase::Joined);
    }

    #[tokio::test]
    async fn test_wait_for_released_by_termination() {
        let gate = Arc::new(JoinGate::new());
        let waiter = {
            let gate = gate.clone();
            tokio::spawn(async move { gate.wait_for(Phase::Joined).await })
        };
        gate.terminate();
        let seen = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(seen, Phase::Terminated);
    }
}
