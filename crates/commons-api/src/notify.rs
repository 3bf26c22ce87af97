//! Notification fan-out.
//!
//! Rows are written inside the caller's unit of work. The bus send, when the
//! recipient mode has one, is queued as a commit hook so a rolled-back write
//! never announces a notification that does not exist.

use tracing::info;

use commons_db::notifications::insert_notification;
use commons_db::queries::{query_active_users, require_user};
use commons_db::{Database, StoreError, UnitOfWork};
use commons_gateway::SharedBus;
use commons_types::events::{EventKey, PushEvent};
use commons_types::models::{NOTIFICATIONS_GROUP, Notification, ObjectRef, User, Verb};

/// Who receives a notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recipients {
    /// Every active user except the actor. One row each, one bus send total.
    Global,
    /// The named users. Rows only; nothing goes over the bus.
    List(Vec<String>),
    /// One user. One row and one bus send naming the recipient.
    Single(String),
}

/// What happened, independent of who hears about it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub verb: Verb,
    pub key: EventKey,
    pub target_id: Option<String>,
    pub action_object: Option<ObjectRef>,
}

impl Notice {
    pub fn new(verb: Verb, key: EventKey) -> Self {
        Self {
            verb,
            key,
            target_id: None,
            action_object: None,
        }
    }

    pub fn target(mut self, id: impl ToString) -> Self {
        self.target_id = Some(id.to_string());
        self
    }

    pub fn object(mut self, object: ObjectRef) -> Self {
        self.action_object = Some(object);
        self
    }
}

/// Persist the rows for `recipients` and schedule the matching bus send.
pub fn notify(
    uow: &mut UnitOfWork<'_>,
    bus: &SharedBus,
    actor: &User,
    recipients: &Recipients,
    notice: &Notice,
) -> Result<Vec<Notification>, StoreError> {
    let (targets, event) = match recipients {
        Recipients::Global => (
            query_active_users(uow, &actor.username)?,
            Some(PushEvent::notification(notice.key, &actor.username, None, None)),
        ),
        Recipients::List(usernames) => {
            let mut users = Vec::with_capacity(usernames.len());
            for name in usernames {
                users.push(require_user(uow, name)?);
            }
            (users, None)
        }
        Recipients::Single(username) => (
            vec![require_user(uow, username)?],
            Some(PushEvent::notification(
                notice.key,
                &actor.username,
                notice.target_id.clone(),
                Some(username),
            )),
        ),
    };

    let mut rows = Vec::with_capacity(targets.len());
    for recipient in &targets {
        rows.push(insert_notification(uow, actor, recipient, notice.verb, notice.action_object)?);
    }

    info!(
        "{} {:?} fan-out wrote {} notifications ({:?})",
        actor.username,
        notice.verb,
        rows.len(),
        notice.key
    );

    if let Some(event) = event {
        let bus = bus.clone();
        uow.on_commit(move || {
            bus.send(NOTIFICATIONS_GROUP, event);
        });
    }

    Ok(rows)
}

/// [`notify`] in a transaction of its own, resolving the actor by name.
pub fn notify_now(
    db: &Database,
    bus: &SharedBus,
    actor: &str,
    recipients: &Recipients,
    notice: &Notice,
) -> Result<Vec<Notification>, StoreError> {
    db.transaction(|uow| {
        let actor = require_user(uow, actor)?;
        notify(uow, bus, &actor, recipients, notice)
    })
}
