//! Session bus integration: name presence and org.gtk.Actions.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;

use anyhow::{Context, Result};
use ddterm_ipc::Action;
use futures_util::StreamExt;
use tokio::task::JoinHandle;
use zbus::fdo::DBusProxy;
use zbus::names::BusName;
use zbus::proxy::CacheProperties;
use zbus::zvariant::OwnedValue;
use zbus::{proxy, Connection};

use crate::platform::{ActionGroup, Bus, WatchId};

/// GApplication action group interface.
#[proxy(
    interface = "org.gtk.Actions",
    default_service = "com.github.amezin.ddterm",
    default_path = "/com/github/amezin/ddterm"
)]
trait GtkActions {
    fn activate(
        &self,
        action_name: &str,
        parameter: Vec<OwnedValue>,
        platform_data: HashMap<String, OwnedValue>,
    ) -> zbus::Result<()>;
}

pub struct SessionBus {
    connection: Connection,
    next_id: Cell<WatchId>,
    watches: RefCell<HashMap<WatchId, JoinHandle<()>>>,
}

impl SessionBus {
    pub async fn connect() -> Result<Self> {
        let connection = Connection::session()
            .await
            .context("Failed to connect to D-Bus session bus")?;

        tracing::info!("Connected to D-Bus session bus");

        Ok(Self {
            connection,
            next_id: Cell::new(1),
            watches: RefCell::new(HashMap::new()),
        })
    }
}

impl Bus for SessionBus {
    fn watch_name(
        &self,
        name: &str,
        on_appeared: Box<dyn Fn()>,
        on_vanished: Box<dyn Fn()>,
    ) -> Result<WatchId> {
        // Reject malformed names before spawning anything
        BusName::try_from(name).with_context(|| format!("Invalid bus name {:?}", name))?;

        let id = self.next_id.get();
        self.next_id.set(id + 1);

        let connection = self.connection.clone();
        let name = name.to_string();
        let task = tokio::task::spawn_local(async move {
            if let Err(e) = watch_name_owner(&connection, &name, &*on_appeared, &*on_vanished).await {
                tracing::warn!("Stopped watching {}: {:#}", name, e);
            }
        });

        self.watches.borrow_mut().insert(id, task);
        Ok(id)
    }

    fn unwatch_name(&self, id: WatchId) {
        if let Some(task) = self.watches.borrow_mut().remove(&id) {
            task.abort();
        }
    }

    fn action_group(&self, name: &str, path: &str) -> Box<dyn ActionGroup> {
        Box::new(RemoteActionGroup {
            connection: self.connection.clone(),
            name: name.to_string(),
            path: path.to_string(),
        })
    }
}

impl Drop for SessionBus {
    fn drop(&mut self) {
        for (_, task) in self.watches.borrow_mut().drain() {
            task.abort();
        }
    }
}

async fn watch_name_owner(
    connection: &Connection,
    name: &str,
    on_appeared: &dyn Fn(),
    on_vanished: &dyn Fn(),
) -> Result<()> {
    let proxy = DBusProxy::new(connection).await?;
    // Subscribe before querying, so a change in between is not lost
    let mut changes = proxy
        .receive_name_owner_changed_with_args(&[(0, name)])
        .await?;

    let mut present = proxy.name_has_owner(BusName::try_from(name)?).await?;
    tracing::debug!("{} has owner: {}", name, present);
    if present {
        on_appeared();
    } else {
        on_vanished();
    }

    while let Some(signal) = changes.next().await {
        let args = signal.args()?;
        let has_owner = args.new_owner().is_some();
        // An owner replaced by another owner counts as a new appearance
        if has_owner {
            present = true;
            on_appeared();
        } else if present {
            present = false;
            on_vanished();
        }
    }

    Ok(())
}

/// Remote action group of a running application.
///
/// Calls are fire and forget; a failure is logged and never retried, the
/// next presence change will replace or drop this handle.
pub struct RemoteActionGroup {
    connection: Connection,
    name: String,
    path: String,
}

impl ActionGroup for RemoteActionGroup {
    fn activate_action(&self, action: Action) {
        let connection = self.connection.clone();
        let name = self.name.clone();
        let path = self.path.clone();
        tokio::task::spawn_local(async move {
            if let Err(e) = activate(&connection, &name, &path, action).await {
                tracing::warn!("Failed to activate {} on {}: {:#}", action, name, e);
            }
        });
    }
}

async fn activate(connection: &Connection, name: &str, path: &str, action: Action) -> Result<()> {
    let proxy = GtkActionsProxy::builder(connection)
        .destination(name)?
        .path(path)?
        .cache_properties(CacheProperties::No)
        .build()
        .await?;

    proxy
        .activate(action.name(), Vec::new(), HashMap::new())
        .await
        .with_context(|| format!("org.gtk.Actions.Activate({})", action))?;

    tracing::debug!("Activated {} on {}", action, name);
    Ok(())
}
