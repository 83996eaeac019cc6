//! End-to-end flows over the in-memory store and the mock transport:
//! member welcomes, format fallback, callback navigation, and admin wizards.

use std::sync::Arc;
use welcome_service::handlers::{self, BotContext};
use welcome_service::models::{Button, Command, FormatMode};
use welcome_service::services::telegram::{CallbackQuery, IncomingMessage, TgChat, TgUser};
use welcome_service::services::{
    Delivery, KeyboardButton, MemoryStore, MockTransport, NodeStore, TransportError, TreeEditor,
    WizardSessions,
};

const ADMIN_ID: i64 = 99;
const BOT_ID: i64 = 424242;
const CHAT_ID: i64 = -100_500;

fn test_ctx() -> (BotContext, Arc<MemoryStore>, Arc<MockTransport>) {
    let store = Arc::new(MemoryStore::new());
    let transport = Arc::new(MockTransport::new());
    let ctx = BotContext {
        admin_id: ADMIN_ID,
        bot_id: BOT_ID,
        store: store.clone(),
        registry: store.clone(),
        editor: TreeEditor::new(store.clone()),
        delivery: Delivery::new(transport.clone()),
        sessions: Arc::new(WizardSessions::new()),
    };
    (ctx, store, transport)
}

fn user(id: i64, name: &str) -> TgUser {
    TgUser {
        id,
        is_bot: false,
        first_name: name.to_string(),
        username: None,
    }
}

fn chat() -> TgChat {
    TgChat {
        id: CHAT_ID,
        title: Some("Rustaceans".to_string()),
        kind: "supergroup".to_string(),
        is_forum: None,
    }
}

fn join_message(members: Vec<TgUser>) -> IncomingMessage {
    IncomingMessage {
        message_id: 1,
        from: Some(user(ADMIN_ID, "Admin")),
        chat: chat(),
        text: None,
        photo: None,
        new_chat_members: Some(members),
        left_chat_member: None,
        message_thread_id: None,
    }
}

fn text_message(from: TgUser, text: &str) -> IncomingMessage {
    IncomingMessage {
        message_id: 2,
        from: Some(from),
        chat: chat(),
        text: Some(text.to_string()),
        photo: None,
        new_chat_members: None,
        left_chat_member: None,
        message_thread_id: None,
    }
}

fn callback_query(from: TgUser, data: &str) -> CallbackQuery {
    CallbackQuery {
        id: "cbq-1".to_string(),
        from,
        data: Some(data.to_string()),
        message: Some(IncomingMessage {
            message_id: 7,
            from: None,
            chat: chat(),
            text: Some("menu".to_string()),
            photo: None,
            new_chat_members: None,
            left_chat_member: None,
            message_thread_id: None,
        }),
    }
}

#[tokio::test]
async fn new_member_receives_personalized_welcome() {
    let (ctx, store, transport) = test_ctx();
    let root = store.get_root(CHAT_ID).await.unwrap();
    store
        .update_text(root.id, "Hi {name}, welcome to {group_name}!")
        .await
        .unwrap();
    store
        .update_format_mode(root.id, FormatMode::Plain)
        .await
        .unwrap();

    handlers::member::handle_new_members(&ctx, &join_message(vec![user(7, "Ana")]))
        .await
        .unwrap();

    let deliveries = transport.deliveries();
    assert_eq!(deliveries.len(), 1);
    assert_eq!(deliveries[0].body, "Hi Ana, welcome to Rustaceans!");
    assert_eq!(store.welcomes_sent(CHAT_ID), 1);
}

#[tokio::test]
async fn rejected_markup_falls_back_to_plain_once() {
    let (ctx, store, transport) = test_ctx();
    let root = store.get_root(CHAT_ID).await.unwrap();
    store.update_text(root.id, "*Hi* {name}").await.unwrap();
    store
        .update_format_mode(root.id, FormatMode::MarkdownV2)
        .await
        .unwrap();

    transport.fail_next(TransportError::UnparseableMarkup);
    handlers::member::handle_new_members(&ctx, &join_message(vec![user(7, "Ana")]))
        .await
        .unwrap();

    let deliveries = transport.deliveries();
    assert_eq!(deliveries.len(), 1);
    assert_eq!(deliveries[0].format_mode, FormatMode::Plain);
    assert_eq!(deliveries[0].body, "*Hi* Ana");
}

#[tokio::test]
async fn disabled_welcome_skips_delivery() {
    let (ctx, store, transport) = test_ctx();
    use welcome_service::services::ChatRegistry;
    assert!(!store.toggle_welcome(CHAT_ID).await.unwrap());

    handlers::member::handle_new_members(&ctx, &join_message(vec![user(7, "Ana")]))
        .await
        .unwrap();

    assert_eq!(transport.delivery_count(), 0);
    assert_eq!(store.welcomes_sent(CHAT_ID), 0);
}

#[tokio::test]
async fn other_bots_are_never_welcomed() {
    let (ctx, _store, transport) = test_ctx();
    let mut bot = user(555, "OtherBot");
    bot.is_bot = true;

    handlers::member::handle_new_members(&ctx, &join_message(vec![bot]))
        .await
        .unwrap();

    assert_eq!(transport.delivery_count(), 0);
}

#[tokio::test]
async fn adding_the_bot_registers_the_group() {
    let (ctx, store, transport) = test_ctx();
    let mut me = user(BOT_ID, "WelcomeBot");
    me.is_bot = true;

    handlers::member::handle_new_members(&ctx, &join_message(vec![me]))
        .await
        .unwrap();

    use welcome_service::services::ChatRegistry;
    let group = store.get_group(CHAT_ID).await.unwrap().unwrap();
    assert_eq!(group.title, "Rustaceans");
    assert_eq!(group.added_by, Some(ADMIN_ID));
    assert!(group.active);
    // The intro message carries the configuration entry point.
    assert_eq!(transport.delivery_count(), 1);
}

#[tokio::test]
async fn navigation_edits_the_message_in_place() {
    let (ctx, store, transport) = test_ctx();
    let root = store.get_root(CHAT_ID).await.unwrap();
    let child_id = ctx
        .editor
        .add_child(root.id, "More", "Deep dive", FormatMode::Plain)
        .await
        .unwrap();

    let query = callback_query(user(7, "Ana"), &Command::Navigate { node_id: child_id }.encode());
    handlers::callback::handle_callback(&ctx, &query)
        .await
        .unwrap();

    let deliveries = transport.deliveries();
    assert_eq!(deliveries.len(), 1);
    assert!(deliveries[0].edited);
    assert_eq!(deliveries[0].body, "Deep dive");

    // A child's keyboard always ends with the Back/Home row.
    let keyboard = deliveries[0].keyboard.as_ref().unwrap();
    let last_row = keyboard.rows.last().unwrap();
    assert_eq!(last_row.len(), 2);
    assert!(matches!(
        &last_row[0],
        KeyboardButton::Callback { data, .. } if data == &Command::Navigate { node_id: root.id }.encode()
    ));
}

#[tokio::test]
async fn admin_commands_are_refused_for_other_users() {
    let (ctx, store, transport) = test_ctx();
    let root = store.get_root(CHAT_ID).await.unwrap();

    let query = callback_query(
        user(7, "Ana"),
        &Command::DeleteSubtree { node_id: root.id }.encode(),
    );
    handlers::callback::handle_callback(&ctx, &query)
        .await
        .unwrap();

    assert_eq!(transport.delivery_count(), 0);
    assert!(store.get_node(root.id).await.unwrap().is_some());
    let answers = transport.answers();
    assert!(answers[0].contains("Admins only"));
}

#[tokio::test]
async fn unknown_callback_payloads_are_ignored() {
    let (ctx, _store, transport) = test_ctx();

    let query = callback_query(user(ADMIN_ID, "Admin"), "wb_legacy_12");
    handlers::callback::handle_callback(&ctx, &query)
        .await
        .unwrap();

    assert_eq!(transport.delivery_count(), 0);
    assert_eq!(transport.answers().len(), 1);
}

#[tokio::test]
async fn url_button_wizard_adds_a_trailing_row() {
    let (ctx, store, transport) = test_ctx();
    let root = store.get_root(CHAT_ID).await.unwrap();

    let query = callback_query(
        user(ADMIN_ID, "Admin"),
        &Command::AddUrlButton { node_id: root.id }.encode(),
    );
    handlers::callback::handle_callback(&ctx, &query)
        .await
        .unwrap();
    assert!(transport.delivery_count() >= 1); // label prompt

    handlers::input::handle_message(&ctx, &text_message(user(ADMIN_ID, "Admin"), "Docs"))
        .await
        .unwrap();
    handlers::input::handle_message(&ctx, &text_message(user(ADMIN_ID, "Admin"), "https://docs.rs"))
        .await
        .unwrap();

    let node = store.get_node(root.id).await.unwrap().unwrap();
    assert_eq!(
        node.buttons.last().unwrap(),
        &vec![Button::Url {
            text: "Docs".to_string(),
            url: "https://docs.rs".to_string(),
        }]
    );
    assert!(ctx.sessions.current(ADMIN_ID).is_none());
}

#[tokio::test]
async fn cancel_aborts_a_wizard_without_changes() {
    let (ctx, store, _transport) = test_ctx();
    let root = store.get_root(CHAT_ID).await.unwrap();

    let query = callback_query(
        user(ADMIN_ID, "Admin"),
        &Command::AddSubmenu { node_id: root.id }.encode(),
    );
    handlers::callback::handle_callback(&ctx, &query)
        .await
        .unwrap();
    handlers::input::handle_message(&ctx, &text_message(user(ADMIN_ID, "Admin"), "CANCEL"))
        .await
        .unwrap();

    assert!(ctx.sessions.current(ADMIN_ID).is_none());
    let node = store.get_node(root.id).await.unwrap().unwrap();
    assert!(node.buttons.is_empty());
    assert!(store.get_children(CHAT_ID, root.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn submenu_wizard_creates_child_with_parent_format() {
    let (ctx, store, _transport) = test_ctx();
    let root = store.get_root(CHAT_ID).await.unwrap();
    store
        .update_format_mode(root.id, FormatMode::MarkdownV2)
        .await
        .unwrap();

    let query = callback_query(
        user(ADMIN_ID, "Admin"),
        &Command::AddSubmenu { node_id: root.id }.encode(),
    );
    handlers::callback::handle_callback(&ctx, &query)
        .await
        .unwrap();
    handlers::input::handle_message(&ctx, &text_message(user(ADMIN_ID, "Admin"), "Rules"))
        .await
        .unwrap();
    handlers::input::handle_message(&ctx, &text_message(user(ADMIN_ID, "Admin"), "Be kind."))
        .await
        .unwrap();

    let children = store.get_children(CHAT_ID, root.id).await.unwrap();
    assert_eq!(children.len(), 1);
    assert_eq!(children[0].text, "Be kind.");
    assert_eq!(children[0].format_mode, FormatMode::MarkdownV2);
}

#[tokio::test]
async fn delete_subtree_via_callback_restores_parent() {
    let (ctx, store, transport) = test_ctx();
    let root = store.get_root(CHAT_ID).await.unwrap();
    let child_id = ctx
        .editor
        .add_child(root.id, "Temp", "Temp body", FormatMode::Html)
        .await
        .unwrap();

    let query = callback_query(
        user(ADMIN_ID, "Admin"),
        &Command::DeleteSubtree { node_id: child_id }.encode(),
    );
    handlers::callback::handle_callback(&ctx, &query)
        .await
        .unwrap();

    assert!(store.get_node(child_id).await.unwrap().is_none());
    let root = store.get_node(root.id).await.unwrap().unwrap();
    assert!(root.buttons.is_empty());
    assert!(transport.answers()[0].contains("Section deleted"));
}

#[tokio::test]
async fn welcome_body_wizard_updates_settings_and_root() {
    let (ctx, store, transport) = test_ctx();
    let root = store.get_root(CHAT_ID).await.unwrap();

    let query = callback_query(
        user(ADMIN_ID, "Admin"),
        &Command::EditWelcomeMessage { chat_id: CHAT_ID }.encode(),
    );
    handlers::callback::handle_callback(&ctx, &query)
        .await
        .unwrap();
    handlers::input::handle_message(
        &ctx,
        &text_message(user(ADMIN_ID, "Admin"), "Hello {name}!"),
    )
    .await
    .unwrap();

    use welcome_service::services::ChatRegistry;
    let settings = store.welcome_settings(CHAT_ID).await.unwrap().unwrap();
    assert_eq!(settings.message.as_deref(), Some("Hello {name}!"));
    let root = store.get_node(root.id).await.unwrap().unwrap();
    assert_eq!(root.text, "Hello {name}!");

    // The confirmation offers the button manager.
    let last = transport.deliveries().into_iter().last().unwrap();
    let keyboard = last.keyboard.unwrap();
    assert!(matches!(
        &keyboard.rows[0][0],
        KeyboardButton::Callback { data, .. }
            if data == &Command::ManageButtons { chat_id: CHAT_ID }.encode()
    ));
}

#[tokio::test]
async fn removing_the_bot_deactivates_the_group() {
    let (ctx, store, _transport) = test_ctx();
    let mut me = user(BOT_ID, "WelcomeBot");
    me.is_bot = true;
    handlers::member::handle_new_members(&ctx, &join_message(vec![me.clone()]))
        .await
        .unwrap();

    let mut leave = join_message(vec![]);
    leave.new_chat_members = None;
    leave.left_chat_member = Some(me);
    handlers::member::handle_member_left(&ctx, &leave)
        .await
        .unwrap();

    use welcome_service::services::ChatRegistry;
    let group = store.get_group(CHAT_ID).await.unwrap().unwrap();
    assert!(!group.active);
}

#[tokio::test]
async fn welcome_preview_goes_to_the_admins_private_chat() {
    let (ctx, store, transport) = test_ctx();
    store.get_root(CHAT_ID).await.unwrap();

    let query = callback_query(
        user(ADMIN_ID, "Admin"),
        &Command::TestWelcome { chat_id: CHAT_ID }.encode(),
    );
    handlers::callback::handle_callback(&ctx, &query)
        .await
        .unwrap();

    let deliveries = transport.deliveries();
    assert_eq!(deliveries.len(), 1);
    assert_eq!(deliveries[0].chat_id, ADMIN_ID);
    assert!(transport.answers()[0].contains("private chat"));
}

#[tokio::test]
async fn failed_preview_asks_for_a_private_chat_first() {
    let (ctx, store, transport) = test_ctx();
    store.get_root(CHAT_ID).await.unwrap();

    // Telegram refuses sends to users who never started a private chat.
    transport.fail_next(TransportError::Rejected(
        "Forbidden: bot can't initiate conversation with a user".to_string(),
    ));
    let query = callback_query(
        user(ADMIN_ID, "Admin"),
        &Command::TestWelcome { chat_id: CHAT_ID }.encode(),
    );
    handlers::callback::handle_callback(&ctx, &query)
        .await
        .unwrap();

    assert_eq!(transport.delivery_count(), 0);
    assert!(transport.answers()[0].contains("Start a private chat"));
}

#[tokio::test]
async fn stats_screen_reports_welcomes_sent() {
    let (ctx, store, transport) = test_ctx();
    let mut me = user(BOT_ID, "WelcomeBot");
    me.is_bot = true;
    handlers::member::handle_new_members(&ctx, &join_message(vec![me]))
        .await
        .unwrap();
    handlers::member::handle_new_members(&ctx, &join_message(vec![user(7, "Ana")]))
        .await
        .unwrap();

    let query = callback_query(
        user(ADMIN_ID, "Admin"),
        &Command::GroupStats { chat_id: CHAT_ID }.encode(),
    );
    handlers::callback::handle_callback(&ctx, &query)
        .await
        .unwrap();

    let screen = transport.deliveries().into_iter().last().unwrap();
    assert!(screen.edited);
    assert!(screen.body.contains("Rustaceans"));
    assert!(screen.body.contains("Welcomes sent: 1"));
    assert!(!screen.body.contains("Last activity: never"));
    assert_eq!(store.welcomes_sent(CHAT_ID), 1);
}

#[tokio::test]
async fn refreshing_group_info_updates_the_record() {
    let (ctx, store, transport) = test_ctx();
    let mut me = user(BOT_ID, "WelcomeBot");
    me.is_bot = true;
    handlers::member::handle_new_members(&ctx, &join_message(vec![me]))
        .await
        .unwrap();

    {
        let mut metadata = transport.metadata.lock().unwrap();
        metadata.title = Some("Rustaceans 2.0".to_string());
        metadata.member_count = Some(42);
    }
    let query = callback_query(
        user(ADMIN_ID, "Admin"),
        &Command::RefreshGroupInfo { chat_id: CHAT_ID }.encode(),
    );
    handlers::callback::handle_callback(&ctx, &query)
        .await
        .unwrap();

    use welcome_service::services::ChatRegistry;
    let group = store.get_group(CHAT_ID).await.unwrap().unwrap();
    assert_eq!(group.title, "Rustaceans 2.0");
    assert_eq!(group.member_count, Some(42));
    assert!(transport.answers()[0].contains("Group info updated"));
    let screen = transport.deliveries().into_iter().last().unwrap();
    assert!(screen.body.contains("Members: 42"));
}

fn forum_group(welcome_thread_id: Option<i64>) -> welcome_service::models::GroupRecord {
    welcome_service::models::GroupRecord {
        chat_id: CHAT_ID,
        title: "Rustaceans".to_string(),
        kind: Some("supergroup".to_string()),
        added_by: Some(ADMIN_ID),
        added_by_username: None,
        added_by_name: Some("Admin".to_string()),
        member_count: None,
        added_date: chrono::Utc::now(),
        active: true,
        is_forum: true,
        welcome_thread_id,
    }
}

#[tokio::test]
async fn configured_welcome_thread_wins_over_the_join_topic() {
    let (ctx, store, transport) = test_ctx();
    use welcome_service::services::ChatRegistry;
    store.upsert_group(&forum_group(Some(77))).await.unwrap();

    let mut join = join_message(vec![user(7, "Ana")]);
    join.message_thread_id = Some(55);
    handlers::member::handle_new_members(&ctx, &join)
        .await
        .unwrap();

    let deliveries = transport.deliveries();
    assert_eq!(deliveries.len(), 1);
    assert_eq!(deliveries[0].thread_id, Some(77));
    let group = store.get_group(CHAT_ID).await.unwrap().unwrap();
    assert_eq!(group.welcome_thread_id, Some(77));
}

#[tokio::test]
async fn first_join_topic_is_adopted_when_none_is_configured() {
    let (ctx, store, transport) = test_ctx();
    use welcome_service::services::ChatRegistry;
    store.upsert_group(&forum_group(None)).await.unwrap();

    let mut join = join_message(vec![user(7, "Ana")]);
    join.message_thread_id = Some(55);
    handlers::member::handle_new_members(&ctx, &join)
        .await
        .unwrap();

    let deliveries = transport.deliveries();
    assert_eq!(deliveries.len(), 1);
    assert_eq!(deliveries[0].thread_id, Some(55));
    let group = store.get_group(CHAT_ID).await.unwrap().unwrap();
    assert_eq!(group.welcome_thread_id, Some(55));
}

#[tokio::test]
async fn toggle_welcome_reports_new_state() {
    let (ctx, store, transport) = test_ctx();
    store.get_root(CHAT_ID).await.unwrap();

    let query = callback_query(
        user(ADMIN_ID, "Admin"),
        &Command::ToggleWelcome { chat_id: CHAT_ID }.encode(),
    );
    handlers::callback::handle_callback(&ctx, &query)
        .await
        .unwrap();

    assert!(transport.answers()[0].contains("disabled"));
    use welcome_service::services::ChatRegistry;
    let settings = store.welcome_settings(CHAT_ID).await.unwrap().unwrap();
    assert!(!settings.enabled);
}
