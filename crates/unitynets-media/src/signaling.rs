//! Call signaling state machine.
//!
//! One [`CallSession`] exists per call attempt and is a pure reducer over
//! discrete events: local operations return the wire message to transmit,
//! remote signals return the [`SignalingAction`] the driver must perform.
//! "Idle" is the absence of a session; the connection itself reports
//! readiness via [`CallSession::connection_established`] once ICE
//! completes.
//!
//! ```text
//! (no session) --start_call--> Calling --answer+ICE--> Connected --hangup--> Ended
//! (no session) --offer------> Ringing --accept+ICE--> Connected
//! Calling|Ringing --reject/hangup/timeout--> Rejected|Ended
//! ```

use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use unitynets_shared::protocol::{RejectReason, SignalMessage, SignalPayload};
use unitynets_shared::types::{CallType, ChatId, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CallPhase {
    /// Outgoing offer sent, waiting for the callee.
    Calling,
    /// Incoming offer received, waiting for the local user's decision.
    Ringing,
    /// Media path established; the call is live.
    Connected,
    /// Terminal: ended by either side (or timed out before connecting).
    Ended,
    /// Terminal: declined before connecting.
    Rejected,
}

#[derive(Error, Debug)]
pub enum SignalingError {
    #[error("{op} is not valid in phase {phase:?}")]
    InvalidTransition { op: &'static str, phase: CallPhase },

    #[error("Offer payload expected")]
    NotAnOffer,
}

/// What the driver must do in response to a remote signal.
#[derive(Debug)]
pub enum SignalingAction {
    /// Apply the peer's SDP answer to the connection.
    SetRemoteDescription(String),
    /// Feed an ICE candidate to the connection.
    AddIceCandidate(String),
    /// The peer declined; tear down local media.
    PeerRejected(RejectReason),
    /// The peer hung up; tear down local and remote media.
    PeerHungUp,
    /// Signal irrelevant to this call (stale, duplicate, or from a stranger).
    Ignored,
}

pub struct CallSession {
    pub local_user: UserId,
    pub remote_user: UserId,
    pub chat_id: ChatId,
    pub call_type: CallType,
    pub is_incoming: bool,
    /// Caller identity carried by the offer, for the incoming-call screen.
    pub caller_name: String,
    pub caller_avatar: Option<String>,
    phase: CallPhase,
    local_sdp: Option<String>,
    remote_sdp: Option<String>,
    ice_candidates: Vec<String>,
    was_connected: bool,
}

impl CallSession {
    /// Start an outgoing call: returns the session in `Calling` together
    /// with the offer to transmit.
    pub fn outgoing(
        chat_id: ChatId,
        local_user: UserId,
        remote_user: UserId,
        call_type: CallType,
        caller_name: String,
        caller_avatar: Option<String>,
        sdp: String,
    ) -> (Self, SignalMessage) {
        debug!(remote = %remote_user.short(), call_type = %call_type, "creating SDP offer");

        let offer = SignalMessage {
            sender: local_user,
            target: remote_user,
            chat_id,
            payload: SignalPayload::Offer {
                sdp: sdp.clone(),
                call_type,
                caller_name: caller_name.clone(),
                caller_avatar: caller_avatar.clone(),
            },
        };

        let session = Self {
            local_user,
            remote_user,
            chat_id,
            call_type,
            is_incoming: false,
            caller_name,
            caller_avatar,
            phase: CallPhase::Calling,
            local_sdp: Some(sdp),
            remote_sdp: None,
            ice_candidates: Vec::new(),
            was_connected: false,
        };

        (session, offer)
    }

    /// Enter `Ringing` from a received offer.
    pub fn incoming(local_user: UserId, offer: &SignalMessage) -> Result<Self, SignalingError> {
        let SignalPayload::Offer {
            sdp,
            call_type,
            caller_name,
            caller_avatar,
        } = &offer.payload
        else {
            return Err(SignalingError::NotAnOffer);
        };

        debug!(from = %offer.sender.short(), call_type = %call_type, "received SDP offer");

        Ok(Self {
            local_user,
            remote_user: offer.sender,
            chat_id: offer.chat_id,
            call_type: *call_type,
            is_incoming: true,
            caller_name: caller_name.clone(),
            caller_avatar: caller_avatar.clone(),
            phase: CallPhase::Ringing,
            local_sdp: None,
            remote_sdp: Some(sdp.clone()),
            ice_candidates: Vec::new(),
            was_connected: false,
        })
    }

    pub fn phase(&self) -> CallPhase {
        self.phase
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.phase, CallPhase::Ended | CallPhase::Rejected)
    }

    /// Whether the call ever reached `Connected` (decides `call_summary`
    /// vs `missed_call`).
    pub fn was_connected(&self) -> bool {
        self.was_connected
    }

    pub fn local_sdp(&self) -> Option<&str> {
        self.local_sdp.as_deref()
    }

    pub fn remote_sdp(&self) -> Option<&str> {
        self.remote_sdp.as_deref()
    }

    /// Candidates gathered locally so far, in send order.
    pub fn local_candidates(&self) -> &[String] {
        &self.ice_candidates
    }

    /// Accept an incoming call: returns the answer to transmit. The phase
    /// stays `Ringing` until the connection reports established.
    pub fn answer(&mut self, sdp: String) -> Result<SignalMessage, SignalingError> {
        if !self.is_incoming || self.phase != CallPhase::Ringing {
            return Err(SignalingError::InvalidTransition {
                op: "answer",
                phase: self.phase,
            });
        }

        debug!(remote = %self.remote_user.short(), "creating SDP answer");
        self.local_sdp = Some(sdp.clone());

        Ok(SignalMessage {
            sender: self.local_user,
            target: self.remote_user,
            chat_id: self.chat_id,
            payload: SignalPayload::Answer { sdp },
        })
    }

    /// Record a locally gathered ICE candidate and address it to the peer.
    pub fn local_candidate(&mut self, candidate: String) -> SignalMessage {
        self.ice_candidates.push(candidate.clone());

        SignalMessage {
            sender: self.local_user,
            target: self.remote_user,
            chat_id: self.chat_id,
            payload: SignalPayload::IceCandidate(candidate),
        }
    }

    /// The connection reached a connected/completed ICE state.
    pub fn connection_established(&mut self) -> Result<(), SignalingError> {
        match self.phase {
            CallPhase::Calling | CallPhase::Ringing => {
                debug!(remote = %self.remote_user.short(), "call connected");
                self.phase = CallPhase::Connected;
                self.was_connected = true;
                Ok(())
            }
            phase => Err(SignalingError::InvalidTransition {
                op: "connection_established",
                phase,
            }),
        }
    }

    /// Decline an incoming call before connecting.
    pub fn reject(&mut self, reason: RejectReason) -> Result<SignalMessage, SignalingError> {
        if !self.is_incoming || self.phase != CallPhase::Ringing {
            return Err(SignalingError::InvalidTransition {
                op: "reject",
                phase: self.phase,
            });
        }

        self.phase = CallPhase::Rejected;

        Ok(SignalMessage {
            sender: self.local_user,
            target: self.remote_user,
            chat_id: self.chat_id,
            payload: SignalPayload::Reject { reason },
        })
    }

    /// Hang up locally: cancels a pending attempt or ends a connected call.
    pub fn hangup(&mut self) -> Result<SignalMessage, SignalingError> {
        match self.phase {
            CallPhase::Calling | CallPhase::Ringing | CallPhase::Connected => {
                self.phase = CallPhase::Ended;

                Ok(SignalMessage {
                    sender: self.local_user,
                    target: self.remote_user,
                    chat_id: self.chat_id,
                    payload: SignalPayload::Hangup,
                })
            }
            phase => Err(SignalingError::InvalidTransition {
                op: "hangup",
                phase,
            }),
        }
    }

    /// Reduce a remote signal into the action the driver must take.
    pub fn handle_signal(&mut self, signal: &SignalMessage) -> SignalingAction {
        if signal.sender != self.remote_user {
            debug!(from = %signal.sender.short(), "ignoring signal from non-peer");
            return SignalingAction::Ignored;
        }

        match &signal.payload {
            SignalPayload::Offer { .. } => {
                // A duplicate offer for an in-flight call carries nothing new.
                SignalingAction::Ignored
            }
            SignalPayload::Answer { sdp } => {
                if self.phase == CallPhase::Calling {
                    debug!(from = %signal.sender.short(), "received SDP answer");
                    self.remote_sdp = Some(sdp.clone());
                    SignalingAction::SetRemoteDescription(sdp.clone())
                } else {
                    SignalingAction::Ignored
                }
            }
            SignalPayload::IceCandidate(candidate) => {
                if self.is_terminal() {
                    SignalingAction::Ignored
                } else {
                    debug!(from = %signal.sender.short(), "received ICE candidate");
                    SignalingAction::AddIceCandidate(candidate.clone())
                }
            }
            SignalPayload::Reject { reason } => match self.phase {
                CallPhase::Calling | CallPhase::Ringing => {
                    debug!(from = %signal.sender.short(), ?reason, "call rejected by peer");
                    self.phase = CallPhase::Rejected;
                    SignalingAction::PeerRejected(*reason)
                }
                _ => SignalingAction::Ignored,
            },
            SignalPayload::Hangup => {
                if self.is_terminal() {
                    SignalingAction::Ignored
                } else {
                    debug!(from = %signal.sender.short(), "received hangup");
                    self.phase = CallPhase::Ended;
                    SignalingAction::PeerHungUp
                }
            }
        }
    }
}

/// Reject an offer that arrived while another call is in flight, without
/// touching the active session.
pub fn busy_reject(local_user: UserId, offer: &SignalMessage) -> SignalMessage {
    SignalMessage {
        sender: local_user,
        target: offer.sender,
        chat_id: offer.chat_id,
        payload: SignalPayload::Reject {
            reason: RejectReason::Busy,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offer_pair() -> (CallSession, SignalMessage) {
        CallSession::outgoing(
            ChatId::new(),
            UserId::new(),
            UserId::new(),
            CallType::Voice,
            "Ana".into(),
            None,
            "offer-sdp".into(),
        )
    }

    fn connect(caller: &mut CallSession, callee: &mut CallSession) {
        let answer = callee.answer("answer-sdp".into()).unwrap();
        match caller.handle_signal(&answer) {
            SignalingAction::SetRemoteDescription(sdp) => assert_eq!(sdp, "answer-sdp"),
            other => panic!("unexpected action: {other:?}"),
        }
        caller.connection_established().unwrap();
        callee.connection_established().unwrap();
    }

    #[test]
    fn outgoing_enters_calling_with_offer() {
        let (session, offer) = offer_pair();
        assert_eq!(session.phase(), CallPhase::Calling);
        assert!(!session.is_incoming);
        assert!(matches!(offer.payload, SignalPayload::Offer { .. }));
    }

    #[test]
    fn incoming_offer_enters_ringing_with_caller_identity() {
        let (_caller, offer) = offer_pair();
        let callee = CallSession::incoming(offer.target, &offer).unwrap();

        assert_eq!(callee.phase(), CallPhase::Ringing);
        assert!(callee.is_incoming);
        assert_eq!(callee.caller_name, "Ana");
        assert_eq!(callee.remote_user, offer.sender);
        assert_eq!(callee.remote_sdp(), Some("offer-sdp"));
    }

    #[test]
    fn incoming_requires_offer_payload() {
        let (_caller, offer) = offer_pair();
        let hangup = SignalMessage {
            payload: SignalPayload::Hangup,
            ..offer.clone()
        };
        assert!(matches!(
            CallSession::incoming(offer.target, &hangup),
            Err(SignalingError::NotAnOffer)
        ));
    }

    #[test]
    fn full_connect_and_hangup_flow() {
        let (mut caller, offer) = offer_pair();
        let mut callee = CallSession::incoming(offer.target, &offer).unwrap();

        connect(&mut caller, &mut callee);
        assert_eq!(caller.phase(), CallPhase::Connected);
        assert_eq!(callee.phase(), CallPhase::Connected);
        assert!(caller.was_connected());

        let hangup = caller.hangup().unwrap();
        assert_eq!(caller.phase(), CallPhase::Ended);
        assert!(matches!(
            callee.handle_signal(&hangup),
            SignalingAction::PeerHungUp
        ));
        assert_eq!(callee.phase(), CallPhase::Ended);
        assert!(callee.was_connected());
    }

    #[test]
    fn answer_is_rejected_outside_ringing() {
        let (mut caller, offer) = offer_pair();
        // The caller never rings; answering its own call is invalid.
        assert!(caller.answer("sdp".into()).is_err());

        let mut callee = CallSession::incoming(offer.target, &offer).unwrap();
        connect(&mut caller, &mut callee);
        // Already connected: a second accept must be rejected.
        assert!(matches!(
            callee.answer("again".into()),
            Err(SignalingError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn connected_only_allows_hangup() {
        let (mut caller, offer) = offer_pair();
        let mut callee = CallSession::incoming(offer.target, &offer).unwrap();
        connect(&mut caller, &mut callee);

        assert!(callee.reject(RejectReason::Declined).is_err());
        assert!(caller.connection_established().is_err());
        assert!(caller.hangup().is_ok());
    }

    #[test]
    fn reject_only_valid_while_ringing() {
        let (mut caller, offer) = offer_pair();
        assert!(caller.reject(RejectReason::Declined).is_err());

        let mut callee = CallSession::incoming(offer.target, &offer).unwrap();
        let reject = callee.reject(RejectReason::Declined).unwrap();
        assert_eq!(callee.phase(), CallPhase::Rejected);

        assert!(matches!(
            caller.handle_signal(&reject),
            SignalingAction::PeerRejected(RejectReason::Declined)
        ));
        assert_eq!(caller.phase(), CallPhase::Rejected);
        assert!(!caller.was_connected());
    }

    #[test]
    fn cancelled_before_connect_is_not_connected() {
        let (mut caller, offer) = offer_pair();
        let mut callee = CallSession::incoming(offer.target, &offer).unwrap();

        let hangup = caller.hangup().unwrap();
        assert!(matches!(
            callee.handle_signal(&hangup),
            SignalingAction::PeerHungUp
        ));
        assert!(!caller.was_connected());
        assert!(!callee.was_connected());
    }

    #[test]
    fn signals_from_strangers_are_ignored() {
        let (mut caller, offer) = offer_pair();
        let stranger = SignalMessage {
            sender: UserId::new(),
            target: caller.local_user,
            chat_id: offer.chat_id,
            payload: SignalPayload::Hangup,
        };
        assert!(matches!(
            caller.handle_signal(&stranger),
            SignalingAction::Ignored
        ));
        assert_eq!(caller.phase(), CallPhase::Calling);
    }

    #[test]
    fn candidates_after_teardown_are_ignored() {
        let (mut caller, offer) = offer_pair();
        let candidate = caller.local_candidate("cand-1".into());
        assert!(matches!(
            candidate.payload,
            SignalPayload::IceCandidate(_)
        ));
        assert_eq!(caller.local_candidates(), ["cand-1"]);
        assert_eq!(caller.local_sdp(), Some("offer-sdp"));
        caller.hangup().unwrap();

        let late = SignalMessage {
            sender: offer.target,
            target: caller.local_user,
            chat_id: offer.chat_id,
            payload: SignalPayload::IceCandidate("cand-2".into()),
        };
        assert!(matches!(
            caller.handle_signal(&late),
            SignalingAction::Ignored
        ));
    }

    #[test]
    fn busy_reject_addresses_the_offering_peer() {
        let (_caller, offer) = offer_pair();
        let busy = busy_reject(offer.target, &offer);

        assert_eq!(busy.target, offer.sender);
        assert!(matches!(
            busy.payload,
            SignalPayload::Reject {
                reason: RejectReason::Busy
            }
        ));
    }
}
