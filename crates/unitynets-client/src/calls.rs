//! Call management.
//!
//! Drives one [`CallSession`] reducer plus its [`MediaSession`] per call
//! attempt. Exactly one attempt may be active per session; it exclusively
//! owns the capture devices, and every exit path (local hangup, remote
//! reject, timeout, acquisition error, even a failed signaling publish)
//! releases them. Call outcome messages (`call_started`, `call_summary`,
//! `missed_call`) are persisted by the caller side only, so the chat gets a
//! single record per call.

use std::time::{Duration, Instant};

use tracing::{debug, info, warn};
use uuid::Uuid;

use unitynets_media::signaling::{busy_reject, CallPhase, CallSession, SignalingAction};
use unitynets_media::{MediaSession, MediaStream, PlaybackState};
use unitynets_shared::message::MessageContent;
use unitynets_shared::protocol::{RejectReason, SignalMessage, SignalPayload, WireMessage};
use unitynets_shared::types::{CallType, ChatId, UserId};

use crate::error::ClientError;
use crate::events::{
    CallStatePayload, IncomingCallPayload, OperationFailedPayload, PlaybackBlockedPayload,
    EVENT_CALL_STATE_CHANGED, EVENT_INCOMING_CALL, EVENT_OPERATION_FAILED,
    EVENT_PLAYBACK_BLOCKED,
};
use crate::state::ClientSession;

pub(crate) struct ActiveCall {
    /// Monotonic per-session attempt tag; lets the ring-timeout task verify
    /// it is still looking at the call it was armed for.
    attempt: u64,
    signaling: CallSession,
    /// `None` on the callee side until the call is accepted.
    media: Option<MediaSession>,
}

pub(crate) struct CallSlot {
    active: Option<ActiveCall>,
    next_attempt: u64,
}

impl CallSlot {
    pub(crate) fn new() -> Self {
        Self {
            active: None,
            next_attempt: 0,
        }
    }
}

fn snapshot_of(active: &ActiveCall) -> CallStatePayload {
    CallStatePayload {
        chat_id: active.signaling.chat_id.to_string(),
        peer: active.signaling.remote_user.to_string(),
        call_type: active.signaling.call_type,
        phase: active.signaling.phase(),
        is_incoming: active.signaling.is_incoming,
        is_muted: active.media.as_ref().is_some_and(|m| m.is_muted()),
        is_video_off: active.media.as_ref().is_some_and(|m| m.is_video_off()),
        was_connected: active.signaling.was_connected(),
    }
}

/// Opaque stand-in for the platform connection's session description; the
/// signaling layer never inspects it.
fn local_description(user: UserId) -> String {
    format!("sdp:{}:{}", user, Uuid::new_v4())
}

enum SignalFollowup {
    Nothing,
    PublishBusy,
    Ringing { attempt: u64, payload: IncomingCallPayload },
    PeerEnded(ActiveCall),
}

impl ClientSession {
    // ------------------------------------------------------------------
    // Local operations
    // ------------------------------------------------------------------

    /// Start an outgoing call. Valid only while no call is active.
    pub async fn start_call(
        &self,
        chat_id: ChatId,
        peer: UserId,
        call_type: CallType,
    ) -> Result<(), ClientError> {
        let me = self.user_id();

        if self.calls_lock()?.active.is_some() {
            return Err(ClientError::CallInProgress);
        }

        // Exactly one acquisition per attempt, before any signaling.
        let local = match self.inner.media_source.acquire(call_type) {
            Ok(stream) => stream,
            Err(e) => {
                self.emit(
                    EVENT_OPERATION_FAILED,
                    OperationFailedPayload {
                        operation: "start_call".into(),
                        error: e.to_string(),
                    },
                );
                return Err(e.into());
            }
        };

        let (signaling, offer) = CallSession::outgoing(
            chat_id,
            me,
            peer,
            call_type,
            self.display_name().to_string(),
            self.inner.avatar_url.clone(),
            local_description(me),
        );

        let attempt = {
            let mut slot = self.calls_lock()?;
            if slot.active.is_some() {
                local.stop_all();
                return Err(ClientError::CallInProgress);
            }
            let attempt = slot.next_attempt;
            slot.next_attempt += 1;
            slot.active = Some(ActiveCall {
                attempt,
                signaling,
                media: Some(MediaSession::new(call_type, local.clone())),
            });
            attempt
        };

        if let Err(e) = self
            .publish(peer.to_topic(), &WireMessage::Signal(offer))
            .await
        {
            // Media must be released even when signaling delivery fails.
            if let Some(active) = self.take_call(Some(attempt))? {
                release_media(active);
            }
            return Err(e);
        }

        info!(peer = %peer.short(), call_type = %call_type, "Call started");
        self.spawn_ring_timeout(attempt);
        self.emit_call_state()?;
        Ok(())
    }

    /// Accept the ringing incoming call: acquire media, transmit the
    /// answer, and wait for the connection to report established.
    pub async fn accept_call(&self) -> Result<(), ClientError> {
        let call_type = {
            let slot = self.calls_lock()?;
            let active = slot.active.as_ref().ok_or(ClientError::NoActiveCall)?;
            active.signaling.call_type
        };

        let me = self.user_id();
        let local = match self.inner.media_source.acquire(call_type) {
            Ok(stream) => stream,
            Err(e) => {
                // The attempt must still leave the ringing state: tell the
                // caller we are unavailable and tear down.
                self.emit(
                    EVENT_OPERATION_FAILED,
                    OperationFailedPayload {
                        operation: "accept_call".into(),
                        error: e.to_string(),
                    },
                );
                let reject = {
                    let mut slot = self.calls_lock()?;
                    match slot.active.as_mut() {
                        Some(active) => active.signaling.reject(RejectReason::Unavailable).ok(),
                        None => None,
                    }
                };
                if let Some(reject) = reject {
                    let target = reject.target;
                    let _ = self
                        .publish(target.to_topic(), &WireMessage::Signal(reject))
                        .await;
                }
                if let Some(active) = self.take_call(None)? {
                    self.finish_call(active).await;
                }
                return Err(e.into());
            }
        };

        let answer = {
            let mut slot = self.calls_lock()?;
            let active = slot.active.as_mut().ok_or(ClientError::NoActiveCall)?;
            let answer = active.signaling.answer(local_description(me))?;
            active.media = Some(MediaSession::new(call_type, local));
            answer
        };

        let target = answer.target;
        if let Err(e) = self
            .publish(target.to_topic(), &WireMessage::Signal(answer))
            .await
        {
            if let Some(active) = self.take_call(None)? {
                release_media(active);
            }
            return Err(e);
        }

        info!(peer = %target.short(), "Call accepted, awaiting connection");
        self.emit_call_state()?;
        Ok(())
    }

    /// Decline the ringing incoming call.
    pub async fn reject_call(&self) -> Result<(), ClientError> {
        let reject = {
            let mut slot = self.calls_lock()?;
            let active = slot.active.as_mut().ok_or(ClientError::NoActiveCall)?;
            active.signaling.reject(RejectReason::Declined)?
        };

        let target = reject.target;
        let publish_result = self
            .publish(target.to_topic(), &WireMessage::Signal(reject))
            .await;

        if let Some(active) = self.take_call(None)? {
            self.finish_call(active).await;
        }
        publish_result
    }

    /// Hang up: cancels a pending attempt or ends a connected call.
    pub async fn end_call(&self) -> Result<(), ClientError> {
        let hangup = {
            let mut slot = self.calls_lock()?;
            let active = slot.active.as_mut().ok_or(ClientError::NoActiveCall)?;
            active.signaling.hangup()?
        };

        let target = hangup.target;
        let publish_result = self
            .publish(target.to_topic(), &WireMessage::Signal(hangup))
            .await;

        if let Some(active) = self.take_call(None)? {
            self.finish_call(active).await;
        }
        publish_result
    }

    /// The platform connection reported a connected/completed ICE state.
    pub async fn connection_established(&self) -> Result<(), ClientError> {
        let (chat_id, call_type, should_record) = {
            let mut slot = self.calls_lock()?;
            let active = slot.active.as_mut().ok_or(ClientError::NoActiveCall)?;
            active.signaling.connection_established()?;

            let now = Instant::now();
            let call_type = active.signaling.call_type;
            if let Some(media) = active.media.as_mut() {
                media.mark_connected(now);
                media.attach_remote(MediaStream::for_call(call_type));
            }
            (
                active.signaling.chat_id,
                call_type,
                !active.signaling.is_incoming,
            )
        };

        if should_record {
            if let Err(e) = self
                .send_content(chat_id, MessageContent::CallStarted { call_type }, None)
                .await
            {
                warn!(error = %e, "failed to record call start");
            }
        }

        self.emit_call_state()?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // In-call media controls
    // ------------------------------------------------------------------

    pub fn toggle_mute(&self) -> Result<bool, ClientError> {
        let muted = {
            let mut slot = self.calls_lock()?;
            let active = slot.active.as_mut().ok_or(ClientError::NoActiveCall)?;
            let media = active.media.as_mut().ok_or(ClientError::NoActiveCall)?;
            media.toggle_mute()
        };
        self.emit_call_state()?;
        Ok(muted)
    }

    pub fn toggle_video(&self) -> Result<bool, ClientError> {
        let video_off = {
            let mut slot = self.calls_lock()?;
            let active = slot.active.as_mut().ok_or(ClientError::NoActiveCall)?;
            let media = active.media.as_mut().ok_or(ClientError::NoActiveCall)?;
            media.toggle_video()
        };
        self.emit_call_state()?;
        Ok(video_off)
    }

    /// The platform refused to autoplay remote audio; surface the
    /// tap-to-enable affordance.
    pub fn playback_blocked(&self) -> Result<(), ClientError> {
        let chat_id = {
            let mut slot = self.calls_lock()?;
            let active = slot.active.as_mut().ok_or(ClientError::NoActiveCall)?;
            let media = active.media.as_mut().ok_or(ClientError::NoActiveCall)?;
            media.playback_blocked();
            active.signaling.chat_id
        };
        self.emit(
            EVENT_PLAYBACK_BLOCKED,
            PlaybackBlockedPayload {
                chat_id: chat_id.to_string(),
            },
        );
        Ok(())
    }

    /// User-gesture retry for blocked remote playback.
    pub fn resume_playback(&self) -> Result<PlaybackState, ClientError> {
        let mut slot = self.calls_lock()?;
        let active = slot.active.as_mut().ok_or(ClientError::NoActiveCall)?;
        let media = active.media.as_mut().ok_or(ClientError::NoActiveCall)?;
        Ok(media.resume_playback())
    }

    pub fn call_phase(&self) -> Option<CallPhase> {
        self.calls_lock()
            .ok()?
            .active
            .as_ref()
            .map(|a| a.signaling.phase())
    }

    pub fn call_state(&self) -> Option<CallStatePayload> {
        self.calls_lock()
            .ok()?
            .active
            .as_ref()
            .map(snapshot_of)
    }

    /// Elapsed time of the active call (zero until connected).
    pub fn call_duration(&self) -> Option<Duration> {
        let slot = self.calls_lock().ok()?;
        let active = slot.active.as_ref()?;
        let media = active.media.as_ref()?;
        Some(media.duration(Instant::now()))
    }

    // ------------------------------------------------------------------
    // Remote signals (from the bridge)
    // ------------------------------------------------------------------

    pub(crate) async fn on_signal(&self, signal: SignalMessage) -> Result<(), ClientError> {
        let me = self.user_id();
        if signal.target != me {
            return Ok(());
        }

        let followup = {
            let mut slot = self.calls_lock()?;
            if let Some(active) = slot.active.as_mut() {
                let stranger_offer = matches!(signal.payload, SignalPayload::Offer { .. })
                    && signal.sender != active.signaling.remote_user;
                if stranger_offer {
                    SignalFollowup::PublishBusy
                } else {
                    let action = active.signaling.handle_signal(&signal);
                    if let SignalingAction::PeerRejected(reason) = &action {
                        debug!(?reason, "peer rejected call");
                    }
                    // Descriptions and candidates are consumed by the
                    // platform connection; only teardown needs driving here.
                    let ended = matches!(
                        action,
                        SignalingAction::PeerRejected(_) | SignalingAction::PeerHungUp
                    );
                    if ended {
                        match slot.active.take() {
                            Some(ended) => SignalFollowup::PeerEnded(ended),
                            None => SignalFollowup::Nothing,
                        }
                    } else {
                        SignalFollowup::Nothing
                    }
                }
            } else if matches!(signal.payload, SignalPayload::Offer { .. }) {
                let signaling = CallSession::incoming(me, &signal)?;
                let attempt = slot.next_attempt;
                slot.next_attempt += 1;

                let payload = IncomingCallPayload {
                    chat_id: signaling.chat_id.to_string(),
                    caller_id: signaling.remote_user.to_string(),
                    caller_name: signaling.caller_name.clone(),
                    caller_avatar: signaling.caller_avatar.clone(),
                    call_type: signaling.call_type,
                };

                slot.active = Some(ActiveCall {
                    attempt,
                    signaling,
                    media: None,
                });
                SignalFollowup::Ringing { attempt, payload }
            } else {
                // Stale signal for a call that no longer exists.
                SignalFollowup::Nothing
            }
        };

        match followup {
            SignalFollowup::Nothing => Ok(()),
            SignalFollowup::PublishBusy => {
                debug!(from = %signal.sender.short(), "busy, auto-rejecting second offer");
                let busy = busy_reject(me, &signal);
                self.publish(signal.sender.to_topic(), &WireMessage::Signal(busy))
                    .await
            }
            SignalFollowup::Ringing { attempt, payload } => {
                self.spawn_ring_timeout(attempt);
                self.emit(EVENT_INCOMING_CALL, payload);
                self.emit_call_state()?;
                Ok(())
            }
            SignalFollowup::PeerEnded(active) => {
                self.finish_call(active).await;
                Ok(())
            }
        }
    }

    // ------------------------------------------------------------------
    // Shared teardown
    // ------------------------------------------------------------------

    fn spawn_ring_timeout(&self, attempt: u64) {
        let session = self.clone();
        let timeout = self.inner.ring_timeout;
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            session.on_ring_timeout(attempt).await;
        });
    }

    /// Tear down a call that never connected within the ring timeout.
    async fn on_ring_timeout(&self, attempt: u64) {
        let taken = {
            let Ok(mut slot) = self.calls_lock() else {
                return;
            };
            let still_pending = slot.active.as_ref().is_some_and(|active| {
                active.attempt == attempt
                    && matches!(
                        active.signaling.phase(),
                        CallPhase::Calling | CallPhase::Ringing
                    )
            });
            if !still_pending {
                return;
            }
            slot.active.take().map(|mut active| {
                let hangup = active.signaling.hangup().ok();
                (active, hangup)
            })
        };

        let Some((active, hangup)) = taken else { return };

        info!(peer = %active.signaling.remote_user.short(), "call timed out without connecting");

        if let Some(hangup) = hangup {
            let target = hangup.target;
            if let Err(e) = self
                .publish(target.to_topic(), &WireMessage::Signal(hangup))
                .await
            {
                warn!(error = %e, "failed to signal call timeout");
            }
        }
        self.finish_call(active).await;
    }

    fn take_call(&self, attempt: Option<u64>) -> Result<Option<ActiveCall>, ClientError> {
        let mut slot = self.calls_lock()?;
        match attempt {
            Some(attempt)
                if slot
                    .active
                    .as_ref()
                    .is_some_and(|active| active.attempt != attempt) =>
            {
                Ok(None)
            }
            _ => Ok(slot.active.take()),
        }
    }

    /// Release media on every exit path and, on the caller side, persist the
    /// call outcome message.
    async fn finish_call(&self, mut active: ActiveCall) {
        let now = Instant::now();
        let duration = match active.media.as_mut() {
            Some(media) => {
                media.release(now);
                media.duration(now)
            }
            None => Duration::ZERO,
        };

        let signaling = &active.signaling;
        if !signaling.is_incoming {
            let content = if signaling.was_connected() {
                MessageContent::CallSummary {
                    call_type: signaling.call_type,
                    duration_secs: duration.as_secs(),
                }
            } else {
                MessageContent::MissedCall {
                    call_type: signaling.call_type,
                    caller_id: signaling.local_user,
                }
            };

            if let Err(e) = self.send_content(signaling.chat_id, content, None).await {
                warn!(error = %e, "failed to record call outcome");
                self.emit(
                    EVENT_OPERATION_FAILED,
                    OperationFailedPayload {
                        operation: "record_call_outcome".into(),
                        error: e.to_string(),
                    },
                );
            }
        }

        self.emit(EVENT_CALL_STATE_CHANGED, snapshot_of(&active));
    }

    fn emit_call_state(&self) -> Result<(), ClientError> {
        let payload = {
            let slot = self.calls_lock()?;
            slot.active.as_ref().map(snapshot_of)
        };
        if let Some(payload) = payload {
            self.emit(EVENT_CALL_STATE_CHANGED, payload);
        }
        Ok(())
    }
}

fn release_media(mut active: ActiveCall) {
    if let Some(media) = active.media.as_mut() {
        media.release(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::events::EVENT_INCOMING_CALL;
    use crate::testutil::{eventually, start_session, start_session_opts, NoDeviceSource, TestSession};
    use unitynets_media::capture::MediaSource;
    use unitynets_net::{spawn_hub, RealtimeHub};
    use unitynets_shared::types::Chat;

    async fn call_pair(hub: &RealtimeHub) -> (TestSession, TestSession, Chat) {
        let a = start_session(hub, "ana").await;
        let b = start_session(hub, "ben").await;

        let chat = a
            .session
            .ensure_direct_chat(b.session.user_id())
            .await
            .unwrap();
        let b_session = b.session.clone();
        assert!(eventually(|| b_session.chats().map(|c| !c.is_empty()).unwrap_or(false)).await);

        (a, b, chat)
    }

    fn message_kinds(session: &ClientSession, chat: ChatId) -> Vec<&'static str> {
        session
            .history(chat, 50, 0)
            .unwrap()
            .into_iter()
            .map(|m| match m.content {
                MessageContent::CallStarted { .. } => "call_started",
                MessageContent::CallSummary { .. } => "call_summary",
                MessageContent::MissedCall { .. } => "missed_call",
                _ => "other",
            })
            .collect()
    }

    #[tokio::test]
    async fn second_start_call_is_refused() {
        let hub = spawn_hub();
        let (a, b, chat) = call_pair(&hub).await;

        a.session
            .start_call(chat.id, b.session.user_id(), CallType::Voice)
            .await
            .unwrap();

        assert!(matches!(
            a.session
                .start_call(chat.id, b.session.user_id(), CallType::Voice)
                .await,
            Err(ClientError::CallInProgress)
        ));
        assert_eq!(a.media.acquired(), 1);
    }

    #[tokio::test]
    async fn accept_and_end_require_an_active_call() {
        let hub = spawn_hub();
        let a = start_session(&hub, "ana").await;

        assert!(matches!(
            a.session.accept_call().await,
            Err(ClientError::NoActiveCall)
        ));
        assert!(matches!(
            a.session.end_call().await,
            Err(ClientError::NoActiveCall)
        ));
        assert!(a.session.call_phase().is_none());
    }

    #[tokio::test]
    async fn full_video_call_flow() {
        let hub = spawn_hub();
        let (a, b, chat) = call_pair(&hub).await;

        a.session
            .start_call(chat.id, b.session.user_id(), CallType::Video)
            .await
            .unwrap();
        assert_eq!(a.session.call_phase(), Some(CallPhase::Calling));

        let b_session = b.session.clone();
        assert!(
            eventually(|| b_session.call_phase() == Some(CallPhase::Ringing)).await,
            "callee never rang"
        );
        assert!(b.sink.count(EVENT_INCOMING_CALL) >= 1);

        b.session.accept_call().await.unwrap();

        // The platform connections report ICE completion on both ends.
        let a_session = a.session.clone();
        assert!(eventually(|| a_session.call_state().is_some()).await);
        a.session.connection_established().await.unwrap();
        b.session.connection_established().await.unwrap();

        assert_eq!(a.session.call_phase(), Some(CallPhase::Connected));
        assert_eq!(b.session.call_phase(), Some(CallPhase::Connected));

        // An even number of toggles is identity.
        a.session.toggle_mute().unwrap();
        a.session.toggle_video().unwrap();
        a.session.toggle_mute().unwrap();
        a.session.toggle_video().unwrap();
        let state = a.session.call_state().unwrap();
        assert!(!state.is_muted);
        assert!(!state.is_video_off);

        a.session.end_call().await.unwrap();
        assert!(a.session.call_phase().is_none());

        let b_session = b.session.clone();
        assert!(
            eventually(|| b_session.call_phase().is_none()).await,
            "callee never observed the hangup"
        );

        // Every acquired device track is released on both sides.
        assert!(eventually(|| a.media.live_tracks() == 0).await);
        assert!(eventually(|| b.media.live_tracks() == 0).await);

        // The caller recorded the call start and its summary.
        let a_session = a.session.clone();
        assert!(
            eventually(|| {
                let kinds = message_kinds(&a_session, chat.id);
                kinds.contains(&"call_started") && kinds.contains(&"call_summary")
            })
            .await
        );
        assert!(!message_kinds(&a.session, chat.id).contains(&"missed_call"));
    }

    #[tokio::test]
    async fn reject_releases_caller_media_and_records_missed_call() {
        let hub = spawn_hub();
        let (a, b, chat) = call_pair(&hub).await;

        a.session
            .start_call(chat.id, b.session.user_id(), CallType::Voice)
            .await
            .unwrap();
        let b_session = b.session.clone();
        assert!(eventually(|| b_session.call_phase() == Some(CallPhase::Ringing)).await);

        b.session.reject_call().await.unwrap();
        assert!(b.session.call_phase().is_none());

        let a_session = a.session.clone();
        assert!(eventually(|| a_session.call_phase().is_none()).await);
        assert!(eventually(|| a.media.live_tracks() == 0).await);

        let caller = a.session.user_id();
        let a_session = a.session.clone();
        assert!(
            eventually(|| {
                a_session
                    .history(chat.id, 50, 0)
                    .unwrap()
                    .iter()
                    .any(|m| matches!(
                        m.content,
                        MessageContent::MissedCall { caller_id, .. } if caller_id == caller
                    ))
            })
            .await,
            "missed call was never recorded"
        );
    }

    #[tokio::test]
    async fn unanswered_call_times_out_as_missed() {
        let hub = spawn_hub();
        let a = start_session_opts(&hub, "ana", None, Duration::from_millis(150)).await;
        let b = start_session_opts(&hub, "ben", None, Duration::from_millis(150)).await;

        let chat = a
            .session
            .ensure_direct_chat(b.session.user_id())
            .await
            .unwrap();
        let b_session = b.session.clone();
        assert!(eventually(|| b_session.chats().map(|c| !c.is_empty()).unwrap_or(false)).await);

        a.session
            .start_call(chat.id, b.session.user_id(), CallType::Voice)
            .await
            .unwrap();

        // Nobody answers; the attempt must expire on its own.
        let a_session = a.session.clone();
        assert!(
            eventually(|| a_session.call_phase().is_none()).await,
            "caller never timed out"
        );
        let b_session = b.session.clone();
        assert!(eventually(|| b_session.call_phase().is_none()).await);
        assert!(eventually(|| a.media.live_tracks() == 0).await);

        let caller = a.session.user_id();
        let a_session = a.session.clone();
        assert!(
            eventually(|| {
                a_session
                    .history(chat.id, 50, 0)
                    .unwrap()
                    .iter()
                    .any(|m| matches!(
                        m.content,
                        MessageContent::MissedCall { caller_id, call_type: CallType::Voice }
                            if caller_id == caller
                    ))
            })
            .await
        );
    }

    #[tokio::test]
    async fn second_caller_is_rejected_as_busy() {
        let hub = spawn_hub();
        let (a, b, chat) = call_pair(&hub).await;
        let c = start_session(&hub, "cleo").await;
        let c_chat = c
            .session
            .ensure_direct_chat(b.session.user_id())
            .await
            .unwrap();

        a.session
            .start_call(chat.id, b.session.user_id(), CallType::Voice)
            .await
            .unwrap();
        let b_session = b.session.clone();
        assert!(eventually(|| b_session.call_phase() == Some(CallPhase::Ringing)).await);

        c.session
            .start_call(c_chat.id, b.session.user_id(), CallType::Voice)
            .await
            .unwrap();

        // The busy callee auto-rejects the second offer without disturbing
        // the first call attempt.
        let c_session = c.session.clone();
        assert!(
            eventually(|| c_session.call_phase().is_none()).await,
            "second caller was never rejected"
        );
        assert!(eventually(|| c.media.live_tracks() == 0).await);
        assert_eq!(b.session.call_phase(), Some(CallPhase::Ringing));

        let c_session = c.session.clone();
        assert!(
            eventually(|| {
                c_session
                    .history(c_chat.id, 50, 0)
                    .unwrap()
                    .iter()
                    .any(|m| matches!(m.content, MessageContent::MissedCall { .. }))
            })
            .await
        );
    }

    #[tokio::test]
    async fn acquisition_failure_on_accept_leaves_no_dangling_call() {
        let hub = spawn_hub();
        let a = start_session(&hub, "ana").await;
        let b = start_session_opts(
            &hub,
            "ben",
            Some(Arc::new(NoDeviceSource) as Arc<dyn MediaSource>),
            Duration::from_secs(30),
        )
        .await;

        let chat = a
            .session
            .ensure_direct_chat(b.session.user_id())
            .await
            .unwrap();
        let b_session = b.session.clone();
        assert!(eventually(|| b_session.chats().map(|c| !c.is_empty()).unwrap_or(false)).await);

        a.session
            .start_call(chat.id, b.session.user_id(), CallType::Voice)
            .await
            .unwrap();
        let b_session = b.session.clone();
        assert!(eventually(|| b_session.call_phase() == Some(CallPhase::Ringing)).await);

        assert!(matches!(
            b.session.accept_call().await,
            Err(ClientError::Capture(_))
        ));
        // The attempt transitioned out of ringing instead of sticking.
        assert!(b.session.call_phase().is_none());

        let a_session = a.session.clone();
        assert!(
            eventually(|| a_session.call_phase().is_none()).await,
            "caller never learned the callee was unavailable"
        );
        assert!(eventually(|| a.media.live_tracks() == 0).await);
    }

    #[tokio::test]
    async fn start_call_with_no_devices_fails_cleanly() {
        let hub = spawn_hub();
        let a = start_session_opts(
            &hub,
            "ana",
            Some(Arc::new(NoDeviceSource) as Arc<dyn MediaSource>),
            Duration::from_secs(30),
        )
        .await;
        let b = start_session(&hub, "ben").await;
        let chat = a
            .session
            .ensure_direct_chat(b.session.user_id())
            .await
            .unwrap();

        assert!(matches!(
            a.session
                .start_call(chat.id, b.session.user_id(), CallType::Voice)
                .await,
            Err(ClientError::Capture(_))
        ));
        assert!(a.session.call_phase().is_none());
    }
}
