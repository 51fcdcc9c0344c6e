use std::collections::BTreeSet;

use crate::{config::RoutingMode, domain::UserId, errors::Error, Result};

/// Where an inbound message should go.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Resolution {
    /// Forward to these targets; the first one is the primary.
    Targets(Vec<UserId>),
    /// The owner wrote to the relay; never forwarded.
    SelfMessage,
    /// Routing mode needs a target and none is configured.
    NoTarget,
}

/// Resolves forwarding targets and guards the owner-only operations.
#[derive(Clone, Debug)]
pub struct Router {
    owner: UserId,
    mode: RoutingMode,
    dynamic: Option<UserId>,
    target_set: BTreeSet<UserId>,
}

impl Router {
    pub fn new(owner: UserId, mode: RoutingMode) -> Self {
        Self {
            owner,
            mode,
            dynamic: None,
            target_set: BTreeSet::new(),
        }
    }

    pub fn mode(&self) -> RoutingMode {
        self.mode
    }

    pub fn authorize(&self, user_id: UserId) -> bool {
        user_id == self.owner
    }

    pub fn resolve_targets(&self, sender: UserId) -> Resolution {
        if sender == self.owner {
            return Resolution::SelfMessage;
        }
        match self.mode {
            RoutingMode::FixedOwner => Resolution::Targets(vec![self.owner]),
            RoutingMode::Dynamic => match self.dynamic {
                Some(t) => Resolution::Targets(vec![t]),
                None => Resolution::NoTarget,
            },
            RoutingMode::TargetSet if self.target_set.is_empty() => Resolution::NoTarget,
            RoutingMode::TargetSet => Resolution::Targets(self.target_set.iter().copied().collect()),
        }
    }

    /// Every known address, in address-book order.
    pub fn broadcast_targets(&self, known: impl IntoIterator<Item = UserId>) -> Vec<UserId> {
        known.into_iter().collect()
    }

    /// Current configured targets (empty in `fixed_owner` means "the owner").
    pub fn current_targets(&self) -> Vec<UserId> {
        match self.mode {
            RoutingMode::FixedOwner => vec![self.owner],
            RoutingMode::Dynamic => self.dynamic.into_iter().collect(),
            RoutingMode::TargetSet => self.target_set.iter().copied().collect(),
        }
    }

    pub fn set_target(&mut self, actor: UserId, target: UserId) -> Result<()> {
        self.ensure_owner(actor, "settarget")?;
        match self.mode {
            RoutingMode::Dynamic => self.dynamic = Some(target),
            RoutingMode::TargetSet => {
                self.target_set.clear();
                self.target_set.insert(target);
            }
            RoutingMode::FixedOwner => return Err(self.fixed_mode_error()),
        }
        Ok(())
    }

    pub fn clear_target(&mut self, actor: UserId) -> Result<()> {
        self.ensure_owner(actor, "cleartarget")?;
        match self.mode {
            RoutingMode::Dynamic => self.dynamic = None,
            RoutingMode::TargetSet => self.target_set.clear(),
            RoutingMode::FixedOwner => return Err(self.fixed_mode_error()),
        }
        Ok(())
    }

    /// Returns false if the target was already present.
    pub fn add_target(&mut self, actor: UserId, target: UserId) -> Result<bool> {
        self.ensure_owner(actor, "addtarget")?;
        match self.mode {
            RoutingMode::TargetSet => Ok(self.target_set.insert(target)),
            RoutingMode::Dynamic => Err(Error::Validation(
                "Routing mode is dynamic: use /settarget <id> instead.".to_string(),
            )),
            RoutingMode::FixedOwner => Err(self.fixed_mode_error()),
        }
    }

    /// Returns false if the target was not present.
    pub fn remove_target(&mut self, actor: UserId, target: UserId) -> Result<bool> {
        self.ensure_owner(actor, "removetarget")?;
        match self.mode {
            RoutingMode::TargetSet => Ok(self.target_set.remove(&target)),
            RoutingMode::Dynamic if self.dynamic == Some(target) => {
                self.dynamic = None;
                Ok(true)
            }
            RoutingMode::Dynamic => Ok(false),
            RoutingMode::FixedOwner => Err(self.fixed_mode_error()),
        }
    }

    fn ensure_owner(&self, actor: UserId, op: &str) -> Result<()> {
        if self.authorize(actor) {
            return Ok(());
        }
        Err(Error::Unauthorized(format!("{actor} may not run {op}")))
    }

    fn fixed_mode_error(&self) -> Error {
        Error::Validation(
            "Routing mode is fixed_owner: messages always go to the owner.".to_string(),
        )
    }
}
