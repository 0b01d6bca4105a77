//! Message delivery pipeline.
//!
//! Every operation persists to the local store first and only then fans out
//! on the realtime channel, so a failed persist never leaves phantom state
//! to roll back. There is no outbox and no automatic retry: a failed
//! operation returns its error and the user resends.

use chrono::Utc;
use tracing::info;

use unitynets_shared::constants::MAX_MESSAGE_LEN;
use unitynets_shared::message::{Message, MessageContent};
use unitynets_shared::protocol::{
    ChatSync, MessageDelete, MessageEdit, ReactionAction, ReactionUpdate, ReadReceiptNotice,
    WireMessage,
};
use unitynets_shared::types::{Chat, ChatId, MessageId, UserId};
use unitynets_store::{ChatDisplay, StoreError};

use crate::error::ClientError;
use crate::state::ClientSession;

/// An attachment handed to [`ClientSession::send_attachment`].
pub struct Attachment {
    pub kind: AttachmentKind,
    pub file_name: String,
    pub data: Vec<u8>,
}

pub enum AttachmentKind {
    Image { caption: Option<String> },
    Video,
    Voice { duration_secs: u32 },
    File,
}

impl ClientSession {
    // ------------------------------------------------------------------
    // Chats
    // ------------------------------------------------------------------

    /// Find or create the direct chat with `peer`, subscribe to its topic,
    /// and announce it to the peer so they can mirror it.
    pub async fn ensure_direct_chat(&self, peer: UserId) -> Result<Chat, ClientError> {
        let me = self.user_id();
        let chat = self.with_db(|db| db.create_direct_chat(me, peer))?;

        self.subscribe(chat.id.to_topic()).await?;

        let sync = WireMessage::ChatRegistered(ChatSync {
            chat: chat.clone(),
            members: vec![me, peer],
        });
        self.publish(peer.to_topic(), &sync).await?;

        Ok(chat)
    }

    /// Create a group chat. The caller is always a member.
    pub async fn create_group_chat(
        &self,
        name: &str,
        avatar_url: Option<&str>,
        members: &[UserId],
    ) -> Result<Chat, ClientError> {
        let me = self.user_id();
        let mut all_members = members.to_vec();
        if !all_members.contains(&me) {
            all_members.push(me);
        }

        let chat = self.with_db(|db| db.create_group_chat(name, avatar_url, &all_members))?;
        self.subscribe(chat.id.to_topic()).await?;

        let sync = WireMessage::ChatRegistered(ChatSync {
            chat: chat.clone(),
            members: all_members.clone(),
        });
        for member in all_members.iter().filter(|m| **m != me) {
            self.publish(member.to_topic(), &sync).await?;
        }

        Ok(chat)
    }

    pub fn chats(&self) -> Result<Vec<Chat>, ClientError> {
        let me = self.user_id();
        self.with_db(|db| db.list_chats_for_user(me))
    }

    /// Chat title and avatar as this session's user sees them.
    pub fn chat_display(&self, chat_id: ChatId) -> Result<ChatDisplay, ClientError> {
        let me = self.user_id();
        self.with_db(|db| db.display_for(chat_id, me))
    }

    // ------------------------------------------------------------------
    // Messages
    // ------------------------------------------------------------------

    /// Send a text message, clearing our typing indicator first.
    pub async fn send_text(
        &self,
        chat_id: ChatId,
        body: &str,
        reply_to: Option<MessageId>,
    ) -> Result<Message, ClientError> {
        let body = body.trim();
        if body.is_empty() {
            return Err(ClientError::EmptyMessage);
        }
        if body.chars().count() > MAX_MESSAGE_LEN {
            return Err(ClientError::MessageTooLong {
                max: MAX_MESSAGE_LEN,
            });
        }

        // Sending ends the typing indicator; best-effort.
        if let Err(e) = self.stop_typing(chat_id).await {
            tracing::debug!(error = %e, "failed to clear typing indicator");
        }

        self.send_content(
            chat_id,
            MessageContent::Text {
                body: body.to_string(),
            },
            reply_to,
        )
        .await
    }

    /// Upload an attachment to object storage, then send the message whose
    /// content carries the returned URL. Upload failure aborts the send.
    pub async fn send_attachment(
        &self,
        chat_id: ChatId,
        attachment: Attachment,
    ) -> Result<Message, ClientError> {
        let size = attachment.data.len() as u64;
        let stored = self
            .inner
            .objects
            .store(&attachment.file_name, &attachment.data)
            .await?;

        let content = match attachment.kind {
            AttachmentKind::Image { caption } => MessageContent::Image {
                url: stored.url,
                caption,
            },
            AttachmentKind::Video => MessageContent::Video {
                url: stored.url,
                file_name: attachment.file_name,
            },
            AttachmentKind::Voice { duration_secs } => MessageContent::Voice {
                url: stored.url,
                duration_secs,
            },
            AttachmentKind::File => MessageContent::File {
                url: stored.url,
                file_name: attachment.file_name,
                file_size: size,
            },
        };

        self.send_content(chat_id, content, None).await
    }

    /// Persist and fan out a message of any content type.
    pub(crate) async fn send_content(
        &self,
        chat_id: ChatId,
        content: MessageContent,
        reply_to: Option<MessageId>,
    ) -> Result<Message, ClientError> {
        let me = self.user_id();

        if !self.with_db(|db| db.is_participant(chat_id, me))? {
            return Err(ClientError::NotInChat);
        }

        let mut message = Message::new(chat_id, me, content);
        if let Some(target) = reply_to {
            let target_message = self.with_db(|db| db.get_message(target))?;
            if target_message.chat_id != chat_id {
                return Err(ClientError::InvalidReply);
            }
            message = message.with_reply_to(target);
        }

        self.with_db(|db| db.insert_message(&message))?;
        self.publish(
            chat_id.to_topic(),
            &WireMessage::MessageNew(message.clone()),
        )
        .await?;

        info!(msg_id = %message.id, chat = %chat_id, kind = message.content.kind(), "Message sent");
        Ok(message)
    }

    /// Edit one of our own text messages. The store rejects non-sender and
    /// non-text edits before anything is broadcast, so a failed edit leaves
    /// the previous content untouched everywhere.
    pub async fn edit_message(
        &self,
        message_id: MessageId,
        new_body: &str,
    ) -> Result<Message, ClientError> {
        let new_body = new_body.trim();
        if new_body.is_empty() {
            return Err(ClientError::EmptyMessage);
        }
        if new_body.chars().count() > MAX_MESSAGE_LEN {
            return Err(ClientError::MessageTooLong {
                max: MAX_MESSAGE_LEN,
            });
        }

        let me = self.user_id();
        let edited_at = Utc::now();
        let updated =
            self.with_db(|db| db.edit_message(message_id, me, new_body, edited_at))?;

        self.publish(
            updated.chat_id.to_topic(),
            &WireMessage::MessageEdited(MessageEdit {
                chat_id: updated.chat_id,
                message_id,
                sender: me,
                new_body: new_body.to_string(),
                edited_at,
            }),
        )
        .await?;

        Ok(updated)
    }

    /// Soft-delete one of our own messages. Idempotent.
    pub async fn delete_message(&self, message_id: MessageId) -> Result<(), ClientError> {
        let me = self.user_id();
        let message = self.with_db(|db| db.get_message(message_id))?;
        if message.sender_id != me {
            return Err(ClientError::Store(StoreError::NotPermitted));
        }

        self.with_db(|db| db.soft_delete_message(message_id))?;

        self.publish(
            message.chat_id.to_topic(),
            &WireMessage::MessageDeleted(MessageDelete {
                chat_id: message.chat_id,
                message_id,
                sender: me,
            }),
        )
        .await?;

        Ok(())
    }

    /// Toggle our reaction on a message: present → removed, absent → added.
    pub async fn toggle_reaction(
        &self,
        message_id: MessageId,
        emoji: &str,
    ) -> Result<ReactionAction, ClientError> {
        let me = self.user_id();
        let message = self.with_db(|db| db.get_message(message_id))?;
        let action =
            self.with_db(|db| db.toggle_reaction(message_id, message.chat_id, me, emoji))?;

        self.publish(
            message.chat_id.to_topic(),
            &WireMessage::Reaction(ReactionUpdate {
                chat_id: message.chat_id,
                message_id,
                sender: me,
                emoji: emoji.to_string(),
                action,
            }),
        )
        .await?;

        Ok(action)
    }

    /// Record that we read a message; fans out only on the first read.
    pub async fn mark_read(&self, message_id: MessageId) -> Result<(), ClientError> {
        let me = self.user_id();
        let message = self.with_db(|db| db.get_message(message_id))?;
        let read_at = Utc::now();

        let newly_read = self.with_db(|db| db.mark_read(message_id, me, read_at))?;
        if newly_read {
            self.publish(
                message.chat_id.to_topic(),
                &WireMessage::ReadReceipt(ReadReceiptNotice {
                    chat_id: message.chat_id,
                    message_id,
                    reader: me,
                    read_at,
                }),
            )
            .await?;
        }

        Ok(())
    }

    /// Ordered history page for a chat.
    pub fn history(
        &self,
        chat_id: ChatId,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Message>, ClientError> {
        self.with_db(|db| db.get_messages_for_chat(chat_id, limit, offset))
    }

    /// Case-insensitive text search, newest first.
    pub fn search(
        &self,
        query: &str,
        chat_id: Option<ChatId>,
        limit: usize,
    ) -> Result<Vec<Message>, ClientError> {
        self.with_db(|db| db.search_messages(query, chat_id, limit))
    }
}
