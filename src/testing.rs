//! In-memory stores and a wired-up `AppState` for unit tests.

use axum::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};
use tempfile::TempDir;
use tokio::sync::{mpsc, Mutex, RwLock};
use uuid::Uuid;

use crate::{
    attachment::AttachmentStore,
    auth::jwt::create_jwt,
    chat::{
        chat_hydration::Hydrator,
        chat_models::{direct_key, Chat, ChatResponse, NewChat},
        chat_repository::ChatStore,
        chat_service::ChatService,
    },
    error::{AppError, Result},
    message::{
        message_dto::SendMessage,
        message_models::{Message, MessageResponse, NewMessage},
        message_repository::MessageStore,
        message_service::MessageService,
    },
    state::{AppState, Config},
    user::{user_models::User, user_repository::UserDirectory},
    websocket::{ConnectionManager, WsMessage},
};

pub const TEST_JWT_SECRET: &str = "test-secret";

/// Hands out strictly increasing timestamps so ordering never ties.
#[derive(Default)]
struct Clock {
    last: Mutex<Option<DateTime<Utc>>>,
}

impl Clock {
    async fn now(&self) -> DateTime<Utc> {
        let mut last = self.last.lock().await;
        let mut now = Utc::now();
        if let Some(prev) = *last {
            if now <= prev {
                now = prev + Duration::microseconds(1);
            }
        }
        *last = Some(now);
        now
    }
}

#[derive(Default)]
pub struct InMemoryChatStore {
    chats: RwLock<Vec<Chat>>,
    clock: Clock,
    fail_last_message: AtomicBool,
}

impl InMemoryChatStore {
    /// Makes every later `set_last_message` call fail.
    pub fn fail_last_message_updates(&self) {
        self.fail_last_message.store(true, Ordering::SeqCst);
    }
}

fn pair_key(chat: &Chat) -> Option<String> {
    match (chat.is_group_chat, chat.participants.as_slice()) {
        (false, [a, b]) => Some(direct_key(*a, *b)),
        _ => None,
    }
}

#[async_trait]
impl ChatStore for InMemoryChatStore {
    async fn find_direct(&self, a: Uuid, b: Uuid) -> Result<Option<Chat>> {
        let key = direct_key(a, b);
        let chats = self.chats.read().await;
        Ok(chats
            .iter()
            .find(|chat| pair_key(chat).as_deref() == Some(key.as_str()))
            .cloned())
    }

    async fn insert(&self, chat: NewChat) -> Result<Option<Chat>> {
        let now = self.clock.now().await;
        let mut chats = self.chats.write().await;
        let chat = Chat {
            id: Uuid::new_v4(),
            name: chat.name,
            is_group_chat: chat.is_group_chat,
            participants: chat.participants,
            admin_id: chat.admin_id,
            last_message_id: None,
            created_at: now,
            updated_at: now,
        };
        if let Some(key) = pair_key(&chat) {
            if chats.iter().any(|c| pair_key(c).as_deref() == Some(key.as_str())) {
                return Ok(None);
            }
        }
        chats.push(chat.clone());
        Ok(Some(chat))
    }

    async fn find_by_id(&self, chat_id: Uuid) -> Result<Option<Chat>> {
        let chats = self.chats.read().await;
        Ok(chats.iter().find(|c| c.id == chat_id).cloned())
    }

    async fn find_for_participant(&self, user_id: Uuid) -> Result<Vec<Chat>> {
        let chats = self.chats.read().await;
        let mut found: Vec<Chat> = chats
            .iter()
            .filter(|c| c.has_participant(user_id))
            .cloned()
            .collect();
        found.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(found)
    }

    async fn rename(&self, chat_id: Uuid, name: &str) -> Result<Option<Chat>> {
        let now = self.clock.now().await;
        let mut chats = self.chats.write().await;
        Ok(chats.iter_mut().find(|c| c.id == chat_id).map(|chat| {
            chat.name = name.to_string();
            chat.updated_at = now;
            chat.clone()
        }))
    }

    async fn set_last_message(&self, chat_id: Uuid, message_id: Option<Uuid>) -> Result<()> {
        if self.fail_last_message.load(Ordering::SeqCst) {
            return Err(AppError::Internal("chat store unavailable".to_string()));
        }
        let now = self.clock.now().await;
        let mut chats = self.chats.write().await;
        if let Some(chat) = chats.iter_mut().find(|c| c.id == chat_id) {
            chat.last_message_id = message_id;
            chat.updated_at = now;
        }
        Ok(())
    }

    async fn delete(&self, chat_id: Uuid) -> Result<bool> {
        let mut chats = self.chats.write().await;
        let before = chats.len();
        chats.retain(|c| c.id != chat_id);
        Ok(chats.len() < before)
    }
}

/// Messages kept in insertion order, which is also creation order.
#[derive(Default)]
pub struct InMemoryMessageStore {
    messages: RwLock<Vec<Message>>,
    clock: Clock,
}

#[async_trait]
impl MessageStore for InMemoryMessageStore {
    async fn insert(&self, message: NewMessage) -> Result<Message> {
        let now = self.clock.now().await;
        let message = Message {
            id: Uuid::new_v4(),
            chat_id: message.chat_id,
            sender_id: message.sender_id,
            recipient_id: message.recipient_id,
            message_type: message.message_type,
            content: message.content,
            attachments: sqlx::types::Json(message.attachments),
            created_at: now,
            updated_at: now,
        };
        self.messages.write().await.push(message.clone());
        Ok(message)
    }

    async fn find_by_id(&self, message_id: Uuid) -> Result<Option<Message>> {
        let messages = self.messages.read().await;
        Ok(messages.iter().find(|m| m.id == message_id).cloned())
    }

    async fn find_by_chat(&self, chat_id: Uuid) -> Result<Vec<Message>> {
        let messages = self.messages.read().await;
        Ok(messages
            .iter()
            .rev()
            .filter(|m| m.chat_id == chat_id)
            .cloned()
            .collect())
    }

    async fn find_latest(&self, chat_id: Uuid) -> Result<Option<Message>> {
        let messages = self.messages.read().await;
        Ok(messages.iter().rev().find(|m| m.chat_id == chat_id).cloned())
    }

    async fn delete(&self, message_id: Uuid) -> Result<Option<Message>> {
        let mut messages = self.messages.write().await;
        Ok(messages
            .iter()
            .position(|m| m.id == message_id)
            .map(|index| messages.remove(index)))
    }

    async fn delete_by_chat(&self, chat_id: Uuid) -> Result<Vec<Message>> {
        let mut messages = self.messages.write().await;
        let (removed, kept): (Vec<Message>, Vec<Message>) =
            messages.drain(..).partition(|m| m.chat_id == chat_id);
        *messages = kept;
        Ok(removed)
    }
}

pub struct InMemoryUserDirectory {
    users: HashMap<Uuid, User>,
    fail_lookups: AtomicBool,
}

impl InMemoryUserDirectory {
    pub fn with_users(names: &[&str]) -> (Self, Vec<Uuid>) {
        let now = Utc::now();
        let users: Vec<User> = names
            .iter()
            .map(|name| User {
                id: Uuid::new_v4(),
                username: name.to_string(),
                email: format!("{name}@example.com"),
                avatar_url: None,
                is_active: true,
                created_at: now,
                updated_at: now,
            })
            .collect();
        let ids = users.iter().map(|u| u.id).collect();
        let users = users.into_iter().map(|u| (u.id, u)).collect();
        (
            Self {
                users,
                fail_lookups: AtomicBool::new(false),
            },
            ids,
        )
    }

    /// Makes every later batch lookup fail, as used by hydration.
    pub fn fail_batch_lookups(&self) {
        self.fail_lookups.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl UserDirectory for InMemoryUserDirectory {
    async fn find_by_id(&self, user_id: Uuid) -> Result<Option<User>> {
        Ok(self.users.get(&user_id).cloned())
    }

    async fn find_many(&self, user_ids: &[Uuid]) -> Result<Vec<User>> {
        if self.fail_lookups.load(Ordering::SeqCst) {
            return Err(AppError::Internal("user directory unavailable".to_string()));
        }
        Ok(user_ids
            .iter()
            .filter_map(|id| self.users.get(id).cloned())
            .collect())
    }
}

pub fn test_config(upload_dir: &std::path::Path) -> Config {
    Config {
        database_url: "postgres://unused".to_string(),
        jwt_secret: TEST_JWT_SECRET.to_string(),
        host: "127.0.0.1".to_string(),
        port: 3000,
        cors_origins: vec!["http://localhost:3000".to_string()],
        upload_dir: upload_dir.to_path_buf(),
        public_base_url: "http://localhost:3000".to_string(),
        max_attachments: 5,
        ws_heartbeat_secs: 25,
        ws_ping_timeout_secs: 60,
    }
}

/// Four active users (alice, bob, carol, dave) over in-memory stores.
pub struct TestContext {
    pub state: AppState,
    pub chat_store: Arc<dyn ChatStore>,
    pub message_store: Arc<dyn MessageStore>,
    /// Concrete handles on the same stores, for fault injection.
    pub chat_backend: Arc<InMemoryChatStore>,
    pub user_directory: Arc<InMemoryUserDirectory>,
    pub attachment_store: AttachmentStore,
    pub alice: Uuid,
    pub bob: Uuid,
    pub carol: Uuid,
    pub dave: Uuid,
    _upload_dir: TempDir,
}

impl TestContext {
    pub async fn new() -> Self {
        let upload_dir = TempDir::new().expect("temp upload dir");
        let config = Arc::new(test_config(upload_dir.path()));

        let (directory, ids) = InMemoryUserDirectory::with_users(&["alice", "bob", "carol", "dave"]);
        let user_directory = Arc::new(directory);
        let chat_backend = Arc::new(InMemoryChatStore::default());
        let chat_store: Arc<dyn ChatStore> = chat_backend.clone();
        let message_store: Arc<dyn MessageStore> = Arc::new(InMemoryMessageStore::default());

        let state = AppState::new(
            config,
            chat_store.clone(),
            message_store.clone(),
            user_directory.clone(),
            ConnectionManager::new(),
        );

        Self {
            attachment_store: state.attachment_store.clone(),
            state,
            chat_store,
            message_store,
            chat_backend,
            user_directory,
            alice: ids[0],
            bob: ids[1],
            carol: ids[2],
            dave: ids[3],
            _upload_dir: upload_dir,
        }
    }

    pub fn chat_service(&self) -> &ChatService {
        &self.state.chat_service
    }

    pub fn message_service(&self) -> &MessageService {
        &self.state.message_service
    }

    pub fn hydrator(&self) -> &Hydrator {
        self.state.chat_service.hydrator()
    }

    /// Registers a live connection for `user` and returns its event stream.
    pub fn connect(&self, user: Uuid) -> mpsc::UnboundedReceiver<WsMessage> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.state.ws_connections.add_connection(user, tx);
        rx
    }

    pub fn token(&self, user: Uuid) -> String {
        create_jwt(user, TEST_JWT_SECRET, 1).expect("token")
    }

    pub async fn direct_chat(&self, a: Uuid, b: Uuid) -> ChatResponse {
        self.chat_service()
            .create_or_get_direct_chat(a, b)
            .await
            .expect("direct chat")
            .into_inner()
    }

    /// A group administered by `admin` with two of alice, bob and carol as the other members.
    pub async fn group_chat(&self, admin: Uuid, name: &str) -> ChatResponse {
        let members: Vec<Uuid> = [self.alice, self.bob, self.carol]
            .into_iter()
            .filter(|id| *id != admin)
            .take(2)
            .collect();
        self.chat_service()
            .create_group_chat(admin, name.to_string(), members)
            .await
            .expect("group chat")
    }

    pub async fn send_text(&self, sender: Uuid, chat_id: Uuid, content: &str) -> MessageResponse {
        self.message_service()
            .send_message(
                sender,
                chat_id,
                SendMessage {
                    content: content.to_string(),
                    ..SendMessage::default()
                },
            )
            .await
            .expect("send text")
    }
}

pub fn assert_no_event(rx: &mut mpsc::UnboundedReceiver<WsMessage>) {
    if let Ok(event) = rx.try_recv() {
        panic!("unexpected event {}", event.name());
    }
}
