//! Default socket handlers: each one decodes its payload and applies exactly
//! one store action.

use std::sync::Arc;

use onechat_shared::{
    AuthHandshake, EntityRef, GroupBatch, GroupEditEvent, GroupRefEvent, IconChangeEvent,
    MembershipEvent, MessagePayload, MessageRef, Opcode, PermissionEditEvent,
};
use serde_json::Value;

use super::connection::Transport;
use super::router::EventRouter;
use crate::stores::{Action, PermissionKey, StoreHandle};

/// Everything the default handlers write to or call out to.
#[derive(Clone)]
pub struct HandlerContext {
    pub transport: Transport,
    pub store: StoreHandle,
    pub token: String,
    /// Invoked on `USER_AUTH_FAILURE`.
    pub on_auth_failure: Arc<dyn Fn() + Send + Sync>,
}

/// Absent user means the event is about the current user.
fn is_current_user(store: &StoreHandle, user: Option<&EntityRef>) -> bool {
    match user {
        None => true,
        Some(user) => store.current_user_id().as_deref() == Some(user.id.as_str()),
    }
}

pub fn register_default_handlers(router: &EventRouter, ctx: HandlerContext) {
    let transport = ctx.transport.clone();
    let token = ctx.token.clone();
    router.register_event(Opcode::UserAuthInit, move |_| {
        transport.send(&AuthHandshake {
            token: token.clone(),
        })?;
        Ok(())
    });

    let on_auth_failure = ctx.on_auth_failure.clone();
    router.register_event(Opcode::UserAuthFailure, move |_| {
        crate::log_warn!("Socket rejected our token");
        on_auth_failure();
        Ok(())
    });

    let store = ctx.store.clone();
    router.register_typed(Opcode::UserMetadata, move |batch: GroupBatch| {
        store.dispatch(Action::AddGroups(batch.into_vec()));
        Ok(())
    });

    let store = ctx.store.clone();
    router.register_typed(Opcode::GroupCreate, move |batch: GroupBatch| {
        store.dispatch(Action::AddGroups(batch.into_vec()));
        Ok(())
    });

    let store = ctx.store.clone();
    router.register_typed(Opcode::GroupJoin, move |event: MembershipEvent| {
        if is_current_user(&store, event.user.as_ref()) {
            store.dispatch(Action::AddGroups(vec![event.group]));
        }
        Ok(())
    });

    let store = ctx.store.clone();
    router.register_typed(Opcode::GroupLeave, move |event: MembershipEvent| {
        if is_current_user(&store, event.user.as_ref()) {
            store.dispatch(Action::LeaveGroup(event.group.id));
        }
        Ok(())
    });

    let store = ctx.store.clone();
    router.register_typed(Opcode::GroupEdit, move |event: GroupEditEvent| {
        store.dispatch(Action::UpdateGroup(event.group));
        Ok(())
    });

    let store = ctx.store.clone();
    router.register_typed(Opcode::GroupDelete, move |event: GroupRefEvent| {
        store.dispatch(Action::RemoveGroup(event.group.id));
        Ok(())
    });

    let store = ctx.store.clone();
    router.register_typed(Opcode::IconChange, move |event: IconChangeEvent| {
        store.dispatch(Action::ChangeIcon {
            group_id: event.group.id,
            url: event.url,
        });
        Ok(())
    });

    let store = ctx.store.clone();
    router.register_typed(Opcode::PermEdit, move |event: PermissionEditEvent| {
        let key = match event.user {
            Some(user) if !is_current_user(&store, Some(&user)) => {
                PermissionKey::member(event.group.id, user.id)
            }
            _ => PermissionKey::own(event.group.id),
        };
        store.dispatch(Action::SetPermission {
            key,
            bits: event.permissions,
        });
        Ok(())
    });

    let store = ctx.store.clone();
    router.register_typed(Opcode::MessageCreate, move |payload: MessagePayload| {
        store.dispatch(Action::AddMessage(payload));
        Ok(())
    });

    let store = ctx.store.clone();
    router.register_typed(Opcode::MessageEdit, move |payload: MessagePayload| {
        store.dispatch(Action::UpdateMessage(payload));
        Ok(())
    });

    let store = ctx.store;
    router.register_typed(Opcode::MessageDelete, move |message: MessageRef| {
        store.dispatch(Action::RemoveMessage {
            id: message.id,
            group_id: message.group.id,
        });
        Ok(())
    });

    router.register_event(Opcode::InvalidSchema, |d: Value| {
        crate::log_warn!("Server rejected a frame as invalid: {}", d);
        Ok(())
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ws::router::DispatchOutcome;
    use chrono::Utc;
    use futures_channel::mpsc::unbounded;
    use onechat_shared::{Group, User};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Fixture {
        router: EventRouter,
        transport: Transport,
        store: StoreHandle,
        failures: Arc<AtomicUsize>,
    }

    fn fixture() -> Fixture {
        let router = EventRouter::new();
        let transport = Transport::new(|_| {});
        let store = StoreHandle::new(40);
        store.dispatch(Action::SetUser(User {
            id: "me".into(),
            username: "alice".into(),
            avatar_url: None,
            created_at: Utc::now(),
        }));
        let failures = Arc::new(AtomicUsize::new(0));
        let counter = failures.clone();
        register_default_handlers(
            &router,
            HandlerContext {
                transport: transport.clone(),
                store: store.clone(),
                token: "secret".into(),
                on_auth_failure: Arc::new(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                }),
            },
        );
        Fixture {
            router,
            transport,
            store,
            failures,
        }
    }

    fn frame(op: &str, d: Value) -> String {
        json!({ "op": op, "d": d }).to_string()
    }

    fn message(id: &str, group: &str, text: &str) -> Value {
        json!({
            "id": id,
            "text": text,
            "author": { "id": "u2", "username": "bob" },
            "createdAt": "2024-01-01T12:00:00Z",
            "group": { "id": group }
        })
    }

    #[test]
    fn test_auth_init_sends_token_once_open() {
        let f = fixture();
        f.router.dispatch_text(&frame("USER_AUTH_INIT", Value::Null));
        assert_eq!(f.transport.pending(), 1);

        let (tx, mut rx) = unbounded();
        f.transport.on_open(f.transport.generation(), tx);
        let sent = rx.try_recv().unwrap();
        assert_eq!(serde_json::from_str::<Value>(&sent).unwrap(), json!({ "token": "secret" }));
    }

    #[test]
    fn test_auth_failure_calls_hook() {
        let f = fixture();
        f.router.dispatch_text(&frame("USER_AUTH_FAILURE", Value::Null));
        assert_eq!(f.failures.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_metadata_snapshot_populates_groups() {
        let f = fixture();
        f.router.dispatch_text(&frame(
            "USER_METADATA",
            json!([{ "id": "g1", "name": "General" }, { "id": "g2", "name": "Random" }]),
        ));
        assert!(f.store.group("g1").is_some());
        assert!(f.store.group("g2").is_some());
    }

    #[test]
    fn test_message_for_unloaded_group_leaves_store_unchanged() {
        let f = fixture();
        let before = f.store.snapshot();
        let outcome = f
            .router
            .dispatch_text(&frame("MESSAGE_CREATE", message("m1", "g1", "hi")));
        assert_eq!(outcome, DispatchOutcome::Handled(Opcode::MessageCreate));
        assert_eq!(f.store.snapshot(), before);
    }

    #[test]
    fn test_message_lifecycle() {
        let f = fixture();
        f.store.dispatch(Action::AddGroups(vec![Group::new("g1", "General")]));

        f.router
            .dispatch_text(&frame("MESSAGE_CREATE", message("m1", "g1", "hi")));
        f.router
            .dispatch_text(&frame("MESSAGE_EDIT", message("m1", "g1", "hello")));
        let stored = f.store.group("g1").unwrap().messages;
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].text, "hello");

        f.router
            .dispatch_text(&frame("MESSAGE_DELETE", message("m1", "g1", "hello")));
        assert!(f.store.group("g1").unwrap().messages.is_empty());
    }

    #[test]
    fn test_group_edit_icon_and_delete() {
        let f = fixture();
        f.store.dispatch(Action::AddGroups(vec![Group::new("g1", "General")]));

        f.router.dispatch_text(&frame(
            "GROUP_EDIT",
            json!({ "group": { "id": "g1", "name": "Renamed", "description": "d" } }),
        ));
        f.router.dispatch_text(&frame(
            "ICON_CHANGE",
            json!({ "url": "https://cdn/i.png", "group": { "id": "g1" } }),
        ));
        let group = f.store.group("g1").unwrap();
        assert_eq!(group.name, "Renamed");
        assert_eq!(group.icon_url.as_deref(), Some("https://cdn/i.png"));

        f.router
            .dispatch_text(&frame("GROUP_DELETE", json!({ "group": { "id": "g1" } })));
        assert!(f.store.group("g1").is_none());
    }

    #[test]
    fn test_join_and_leave_only_track_current_user() {
        let f = fixture();
        let group = json!({ "id": "g1", "name": "General" });

        f.router.dispatch_text(&frame(
            "GROUP_JOIN",
            json!({ "user": { "id": "someone" }, "group": group }),
        ));
        assert!(f.store.group("g1").is_none());

        f.router.dispatch_text(&frame(
            "GROUP_JOIN",
            json!({ "user": { "id": "me" }, "group": group }),
        ));
        assert!(f.store.group("g1").is_some());

        f.router.dispatch_text(&frame(
            "GROUP_LEAVE",
            json!({ "user": { "id": "someone" }, "group": group }),
        ));
        assert!(f.store.group("g1").is_some());

        f.router.dispatch_text(&frame(
            "GROUP_LEAVE",
            json!({ "user": { "id": "me" }, "group": group }),
        ));
        assert!(f.store.group("g1").is_none());
        assert_eq!(f.store.permission(&PermissionKey::own("g1")), Some(0));
    }

    #[test]
    fn test_perm_edit_keys_by_user() {
        let f = fixture();
        f.router.dispatch_text(&frame(
            "PERM_EDIT",
            json!({ "group": { "id": "g1" }, "user": { "id": "me" }, "permissions": 3 }),
        ));
        f.router.dispatch_text(&frame(
            "PERM_EDIT",
            json!({ "group": { "id": "g1" }, "user": { "id": "u2" }, "permissions": 1 }),
        ));
        assert_eq!(f.store.permission(&PermissionKey::own("g1")), Some(3));
        assert_eq!(f.store.permission(&PermissionKey::member("g1", "u2")), Some(1));
    }

    #[test]
    fn test_bad_payload_is_isolated() {
        let f = fixture();
        assert_eq!(
            f.router
                .dispatch_text(&frame("GROUP_DELETE", json!({ "nope": true }))),
            DispatchOutcome::Failed(Opcode::GroupDelete)
        );
        f.router.dispatch_text(&frame(
            "GROUP_CREATE",
            json!({ "id": "g1", "name": "General" }),
        ));
        assert!(f.store.group("g1").is_some());
    }
}
