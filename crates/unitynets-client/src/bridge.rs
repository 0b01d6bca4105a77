//! Realtime event bridge.
//!
//! Background task that consumes hub notifications, decodes the wire
//! messages, applies them to the local store / typing tracker / call slot,
//! and forwards typed events to the UI sink. Incoming state always lands in
//! the store before the UI hears about it, so a re-render reads consistent
//! data.

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use unitynets_net::BusNotification;
use unitynets_shared::protocol::{
    ChatSync, MessageDelete, MessageEdit, ReactionAction, ReactionUpdate, ReadReceiptNotice,
    WireMessage,
};
use unitynets_shared::message::Message;
use unitynets_store::StoreError;

use crate::error::ClientError;
use crate::events::{
    ChatAddedPayload, MessageDeletedPayload, MessageEditedPayload, NewMessagePayload,
    ReactionPayload, ReadReceiptPayload, EVENT_CHAT_ADDED, EVENT_MESSAGE_DELETED,
    EVENT_MESSAGE_EDITED, EVENT_MESSAGE_REACTION, EVENT_NEW_MESSAGE, EVENT_READ_RECEIPT,
};
use crate::state::ClientSession;

/// Main loop: runs until the hub closes our notification channel.
pub(crate) async fn run(session: ClientSession, mut notif_rx: mpsc::Receiver<BusNotification>) {
    info!("Realtime bridge started");

    while let Some(BusNotification::Event { topic, data }) = notif_rx.recv().await {
        let wire = match WireMessage::from_bytes(&data) {
            Ok(wire) => wire,
            Err(e) => {
                debug!(topic = %topic, error = %e, "Failed to deserialize wire message");
                continue;
            }
        };

        if let Err(e) = apply(&session, wire).await {
            warn!(topic = %topic, error = %e, "failed to apply realtime event");
        }
    }

    warn!("Realtime bridge stopped");
}

async fn apply(session: &ClientSession, wire: WireMessage) -> Result<(), ClientError> {
    match wire {
        WireMessage::MessageNew(message) => on_message_new(session, message),
        WireMessage::MessageEdited(edit) => on_message_edited(session, edit),
        WireMessage::MessageDeleted(delete) => on_message_deleted(session, delete),
        WireMessage::Reaction(update) => on_reaction(session, update),
        WireMessage::ReadReceipt(notice) => on_read_receipt(session, notice),
        WireMessage::Typing(notice) => {
            if notice.sender == session.user_id() {
                return Ok(());
            }
            session.apply_typing_notice(&notice)
        }
        WireMessage::ChatRegistered(sync) => on_chat_registered(session, sync).await,
        WireMessage::Signal(signal) => session.on_signal(signal).await,
    }
}

fn on_message_new(session: &ClientSession, message: Message) -> Result<(), ClientError> {
    // Skip our own fan-out (already stored at send time).
    if message.sender_id == session.user_id() {
        return Ok(());
    }

    match session.with_db(|db| db.insert_message(&message)) {
        Ok(()) => {}
        // Duplicate delivery is expected from a best-effort channel.
        Err(ClientError::Store(StoreError::Sqlite(e))) => {
            debug!(msg_id = %message.id, error = %e, "skipping duplicate or unsyncable message");
            return Ok(());
        }
        Err(e) => return Err(e),
    }

    debug!(msg_id = %message.id, chat = %message.chat_id, "stored incoming message");

    session.emit(
        EVENT_NEW_MESSAGE,
        NewMessagePayload {
            chat_id: message.chat_id.to_string(),
            message_id: message.id.to_string(),
            sender: message.sender_id.to_string(),
            kind: message.content.kind().to_string(),
            created_at: message.created_at.to_rfc3339(),
        },
    );
    Ok(())
}

fn on_message_edited(session: &ClientSession, edit: MessageEdit) -> Result<(), ClientError> {
    match session.with_db(|db| db.edit_message(edit.message_id, edit.sender, &edit.new_body, edit.edited_at))
    {
        Ok(_) => {}
        Err(ClientError::Store(StoreError::NotFound)) => {
            debug!(msg_id = %edit.message_id, "edit for unknown message");
            return Ok(());
        }
        Err(ClientError::Store(StoreError::NotPermitted)) => {
            warn!(msg_id = %edit.message_id, "rejecting edit from non-sender");
            return Ok(());
        }
        Err(e) => return Err(e),
    }

    session.emit(
        EVENT_MESSAGE_EDITED,
        MessageEditedPayload {
            chat_id: edit.chat_id.to_string(),
            message_id: edit.message_id.to_string(),
        },
    );
    Ok(())
}

fn on_message_deleted(session: &ClientSession, delete: MessageDelete) -> Result<(), ClientError> {
    let message = match session.with_db(|db| db.get_message(delete.message_id)) {
        Ok(message) => message,
        Err(ClientError::Store(StoreError::NotFound)) => {
            debug!(msg_id = %delete.message_id, "delete for unknown message");
            return Ok(());
        }
        Err(e) => return Err(e),
    };

    if message.sender_id != delete.sender {
        warn!(msg_id = %delete.message_id, "rejecting delete from non-sender");
        return Ok(());
    }

    session.with_db(|db| db.soft_delete_message(delete.message_id))?;

    session.emit(
        EVENT_MESSAGE_DELETED,
        MessageDeletedPayload {
            chat_id: delete.chat_id.to_string(),
            message_id: delete.message_id.to_string(),
        },
    );
    Ok(())
}

fn on_reaction(session: &ClientSession, update: ReactionUpdate) -> Result<(), ClientError> {
    let applied = match update.action {
        ReactionAction::Add => session.with_db(|db| {
            db.add_reaction(update.message_id, update.chat_id, update.sender, &update.emoji)
        }),
        ReactionAction::Remove => session
            .with_db(|db| db.remove_reaction(update.message_id, update.sender, &update.emoji)),
    };

    match applied {
        Ok(_) => {}
        Err(ClientError::Store(StoreError::Sqlite(e))) => {
            // Reaction for a message we never received; last-writer-wins
            // semantics make dropping it safe.
            debug!(msg_id = %update.message_id, error = %e, "skipping unsyncable reaction");
            return Ok(());
        }
        Err(e) => return Err(e),
    }

    session.emit(
        EVENT_MESSAGE_REACTION,
        ReactionPayload {
            chat_id: update.chat_id.to_string(),
            message_id: update.message_id.to_string(),
            user_id: update.sender.to_string(),
            emoji: update.emoji.clone(),
            action: match update.action {
                ReactionAction::Add => "add".to_string(),
                ReactionAction::Remove => "remove".to_string(),
            },
        },
    );
    Ok(())
}

fn on_read_receipt(session: &ClientSession, notice: ReadReceiptNotice) -> Result<(), ClientError> {
    match session.with_db(|db| db.mark_read(notice.message_id, notice.reader, notice.read_at)) {
        Ok(_) => {}
        Err(ClientError::Store(StoreError::Sqlite(e))) => {
            debug!(msg_id = %notice.message_id, error = %e, "skipping unsyncable receipt");
            return Ok(());
        }
        Err(e) => return Err(e),
    }

    session.emit(
        EVENT_READ_RECEIPT,
        ReadReceiptPayload {
            chat_id: notice.chat_id.to_string(),
            message_id: notice.message_id.to_string(),
            user_id: notice.reader.to_string(),
        },
    );
    Ok(())
}

async fn on_chat_registered(session: &ClientSession, sync: ChatSync) -> Result<(), ClientError> {
    if !sync.members.contains(&session.user_id()) {
        debug!(chat = %sync.chat.id, "ignoring chat registration we are not part of");
        return Ok(());
    }

    session.with_db(|db| db.upsert_chat(&sync.chat, &sync.members))?;
    session.subscribe(sync.chat.id.to_topic()).await?;

    debug!(chat = %sync.chat.id, kind = sync.chat.kind.as_str(), "mirrored chat");

    session.emit(
        EVENT_CHAT_ADDED,
        ChatAddedPayload {
            chat_id: sync.chat.id.to_string(),
            kind: sync.chat.kind.as_str().to_string(),
        },
    );
    Ok(())
}
