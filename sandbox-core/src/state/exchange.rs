//! Exchange state machine driven by the tick loop.
//!
//! One enum replaces the pair of "frame received" / "ready for new frame"
//! flags: the outstanding exchange lives *inside* the
//! [`AwaitingResponse`](ExchangeState::AwaitingResponse) variant, so there
//! can never be two of them, and [`Idle`](ExchangeState::Idle) is the only
//! state that may start a new one.

use std::fmt;
use std::time::{Duration, Instant};

use crate::error::SandboxError;
use crate::network::exchange::{ExchangeResult, PendingExchange};

// ── RecoveryPolicy ───────────────────────────────────────────────

/// What the scheduler does after a network failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryPolicy {
    /// Keep the gate closed until [`ExchangeState::resume`] is called.
    Stall,
    /// Reopen the gate after a delay that doubles per consecutive
    /// failure, starting at `initial` and capped at `max`.
    Backoff { initial: Duration, max: Duration },
}

impl RecoveryPolicy {
    /// Delay before the gate reopens after `consecutive_failures`
    /// failures in a row (counting the current one). `None` means stall.
    pub fn delay_for(&self, consecutive_failures: u32) -> Option<Duration> {
        match self {
            Self::Stall => None,
            Self::Backoff { initial, max } => {
                let shift = consecutive_failures.saturating_sub(1).min(16);
                Some(initial.saturating_mul(1 << shift).min(*max))
            }
        }
    }
}

impl Default for RecoveryPolicy {
    fn default() -> Self {
        Self::Backoff {
            initial: Duration::from_millis(250),
            max: Duration::from_secs(5),
        }
    }
}

// ── ExchangeState ────────────────────────────────────────────────

/// The current phase of the capture/exchange loop.
///
/// ```text
///            ┌────────── finish ◄──────── Decoding
///            ▼                               ▲
///  ┌────► Idle ── begin_send ──► Sending     │ begin_decode
///  │                              │          │
///  │                        await_response   │
///  │                              ▼          │
///  │                       AwaitingResponse ─┘
///  │                              │ fail
///  │                              ▼
///  └── resume / reopen_if_due ── Backoff | Stalled
/// ```
#[derive(Debug, Default)]
pub enum ExchangeState {
    /// Gate open: the next tick samples and sends.
    #[default]
    Idle,

    /// Payload encoded, request being issued.
    Sending { frame: u64, started: Instant },

    /// Request issued; waiting for the completion to land.
    AwaitingResponse {
        frame: u64,
        started: Instant,
        pending: PendingExchange,
    },

    /// Response received; decoding and publishing.
    Decoding { frame: u64 },

    /// A network failure closed the gate until `until`.
    Backoff { until: Instant },

    /// A network failure closed the gate until manually resumed.
    Stalled,
}

/// A finished round trip taken out of [`ExchangeState::AwaitingResponse`].
#[derive(Debug)]
pub struct Completion {
    pub frame: u64,
    pub started: Instant,
    pub bytes_out: usize,
    pub result: ExchangeResult,
}

impl fmt::Display for ExchangeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Sending { frame, .. } => write!(f, "Sending(#{frame})"),
            Self::AwaitingResponse { frame, .. } => write!(f, "AwaitingResponse(#{frame})"),
            Self::Decoding { frame } => write!(f, "Decoding(#{frame})"),
            Self::Backoff { .. } => write!(f, "Backoff"),
            Self::Stalled => write!(f, "Stalled"),
        }
    }
}

impl ExchangeState {
    /// Whether the gate is open.
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    /// Whether an exchange occupies Sending, AwaitingResponse or Decoding.
    pub fn is_in_flight(&self) -> bool {
        matches!(
            self,
            Self::Sending { .. } | Self::AwaitingResponse { .. } | Self::Decoding { .. }
        )
    }

    /// Frame number of the exchange in flight, if any.
    pub fn in_flight_frame(&self) -> Option<u64> {
        match self {
            Self::Sending { frame, .. }
            | Self::AwaitingResponse { frame, .. }
            | Self::Decoding { frame } => Some(*frame),
            _ => None,
        }
    }

    /// Poll the outstanding exchange without blocking.
    ///
    /// Returns `None` while the response is still outstanding or when no
    /// exchange is in flight. The state stays `AwaitingResponse` until the
    /// caller transitions it.
    pub fn try_complete(&mut self) -> Option<Completion> {
        match self {
            Self::AwaitingResponse {
                frame,
                started,
                pending,
            } => pending.try_complete().map(|result| Completion {
                frame: *frame,
                started: *started,
                bytes_out: pending.bytes_out(),
                result,
            }),
            _ => None,
        }
    }

    // ── Transitions ──────────────────────────────────────────────

    /// Transition to `Sending`.
    ///
    /// Valid from: `Idle`.
    pub fn begin_send(&mut self, frame: u64, now: Instant) -> Result<(), SandboxError> {
        match self {
            Self::Idle => {
                *self = Self::Sending {
                    frame,
                    started: now,
                };
                Ok(())
            }
            _ => Err(SandboxError::InvalidTransition(
                "cannot send: gate is closed",
            )),
        }
    }

    /// Transition to `AwaitingResponse`, taking ownership of the exchange.
    ///
    /// Valid from: `Sending`.
    pub fn await_response(&mut self, pending: PendingExchange) -> Result<(), SandboxError> {
        match *self {
            Self::Sending { frame, started } => {
                *self = Self::AwaitingResponse {
                    frame,
                    started,
                    pending,
                };
                Ok(())
            }
            _ => Err(SandboxError::InvalidTransition(
                "cannot await response: not in Sending state",
            )),
        }
    }

    /// Transition to `Decoding`, releasing the completed exchange.
    ///
    /// Valid from: `AwaitingResponse`.
    pub fn begin_decode(&mut self) -> Result<(), SandboxError> {
        match self {
            Self::AwaitingResponse { frame, .. } => {
                let frame = *frame;
                *self = Self::Decoding { frame };
                Ok(())
            }
            _ => Err(SandboxError::InvalidTransition(
                "cannot decode: no response awaited",
            )),
        }
    }

    /// Transition back to `Idle` after a decode, successful or not.
    ///
    /// Valid from: `Decoding`.
    pub fn finish(&mut self) -> Result<(), SandboxError> {
        match self {
            Self::Decoding { .. } => {
                *self = Self::Idle;
                Ok(())
            }
            _ => Err(SandboxError::InvalidTransition(
                "cannot finish: not in Decoding state",
            )),
        }
    }

    /// Record a network failure and close the gate.
    ///
    /// `delay` of `None` stalls; otherwise the gate reopens at `now + delay`.
    ///
    /// Valid from: `Sending`, `AwaitingResponse`, `Decoding`.
    pub fn fail(&mut self, delay: Option<Duration>, now: Instant) -> Result<(), SandboxError> {
        if !self.is_in_flight() {
            return Err(SandboxError::InvalidTransition(
                "cannot fail: no exchange in flight",
            ));
        }
        *self = match delay {
            Some(delay) => Self::Backoff { until: now + delay },
            None => Self::Stalled,
        };
        Ok(())
    }

    /// Reopen the gate if the backoff deadline has passed.
    ///
    /// Returns `true` when the state is (now) `Idle`.
    pub fn reopen_if_due(&mut self, now: Instant) -> bool {
        match self {
            Self::Backoff { until } if now >= *until => {
                *self = Self::Idle;
                true
            }
            Self::Idle => true,
            _ => false,
        }
    }

    /// Reopen the gate unconditionally.
    ///
    /// Valid from: `Backoff`, `Stalled`.
    pub fn resume(&mut self) -> Result<(), SandboxError> {
        match self {
            Self::Backoff { .. } | Self::Stalled => {
                *self = Self::Idle;
                Ok(())
            }
            _ => Err(SandboxError::InvalidTransition(
                "cannot resume: gate is not closed by a failure",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;
    use crate::stream::payload::RequestPayload;

    fn pending() -> (crate::network::CompletionSender, PendingExchange) {
        PendingExchange::for_payload(&RequestPayload {
            width: 1,
            height: 1,
            body: Bytes::from_static(&[0, 0, 0, 0]),
        })
    }

    #[test]
    fn happy_path_cycle() {
        let now = Instant::now();
        let mut state = ExchangeState::default();
        assert!(state.is_idle());

        state.begin_send(7, now).unwrap();
        assert!(state.is_in_flight());

        let (done, p) = pending();
        state.await_response(p).unwrap();
        assert_eq!(state.in_flight_frame(), Some(7));
        assert!(state.try_complete().is_none());

        done.complete(Ok(Bytes::from_static(b"{}")));
        let completion = state.try_complete().unwrap();
        assert_eq!(completion.frame, 7);
        assert_eq!(completion.bytes_out, 4);
        assert!(completion.result.is_ok());

        state.begin_decode().unwrap();
        assert_eq!(state.to_string(), "Decoding(#7)");
        state.finish().unwrap();
        assert!(state.is_idle());
    }

    #[test]
    fn only_idle_may_send() {
        let now = Instant::now();
        let mut state = ExchangeState::default();
        state.begin_send(1, now).unwrap();
        assert!(matches!(
            state.begin_send(2, now),
            Err(SandboxError::InvalidTransition(_))
        ));
        assert_eq!(state.in_flight_frame(), Some(1));
    }

    #[test]
    fn invalid_transitions_are_rejected() {
        let mut state = ExchangeState::Idle;
        assert!(state.begin_decode().is_err());
        assert!(state.finish().is_err());
        assert!(state.resume().is_err());
        assert!(state.fail(None, Instant::now()).is_err());
        let (_done, p) = pending();
        assert!(state.await_response(p).is_err());
        assert!(state.is_idle());
    }

    #[test]
    fn failure_with_delay_backs_off_then_reopens() {
        let t0 = Instant::now();
        let mut state = ExchangeState::Sending {
            frame: 0,
            started: t0,
        };
        state.fail(Some(Duration::from_millis(100)), t0).unwrap();
        assert!(matches!(state, ExchangeState::Backoff { .. }));
        assert!(!state.reopen_if_due(t0 + Duration::from_millis(50)));
        assert!(state.reopen_if_due(t0 + Duration::from_millis(100)));
        assert!(state.is_idle());
    }

    #[test]
    fn failure_without_delay_stalls_until_resumed() {
        let t0 = Instant::now();
        let mut state = ExchangeState::Decoding { frame: 3 };
        state.fail(None, t0).unwrap();
        assert!(matches!(state, ExchangeState::Stalled));
        assert!(!state.reopen_if_due(t0 + Duration::from_secs(3600)));
        state.resume().unwrap();
        assert!(state.is_idle());
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RecoveryPolicy::Backoff {
            initial: Duration::from_millis(100),
            max: Duration::from_millis(700),
        };
        assert_eq!(policy.delay_for(1), Some(Duration::from_millis(100)));
        assert_eq!(policy.delay_for(2), Some(Duration::from_millis(200)));
        assert_eq!(policy.delay_for(3), Some(Duration::from_millis(400)));
        assert_eq!(policy.delay_for(4), Some(Duration::from_millis(700)));
        assert_eq!(policy.delay_for(u32::MAX), Some(Duration::from_millis(700)));
        assert_eq!(RecoveryPolicy::Stall.delay_for(1), None);
    }
}
