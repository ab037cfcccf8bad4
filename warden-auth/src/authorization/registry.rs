//! Policy Registry - write-once role requirements per controller
//!
//! Populated during application wiring, read-only afterwards. Every
//! registration may happen at most once per (controller, kind, action);
//! a second attempt is a configuration error raised at registration time.

use crate::{AuthError, AuthResult, RegistrationKind};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::debug;
use warden_core::ControllerPolicyConfig;

/// Role requirements registered for one controller
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ControllerPolicy {
    /// `Some` once a class-level policy is registered, even with no roles
    pub class_roles: Option<Vec<String>>,
    pub action_roles: BTreeMap<String, Vec<String>>,
    pub anonymous_actions: BTreeSet<String>,
}

/// Effective policy for one controller/action pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyLookup {
    pub is_anonymous: bool,
    /// Class roles followed by action roles, duplicates kept
    pub effective_roles: Vec<String>,
}

impl PolicyLookup {
    pub fn anonymous() -> Self {
        Self {
            is_anonymous: true,
            effective_roles: Vec::new(),
        }
    }

    pub fn protected(effective_roles: Vec<String>) -> Self {
        Self {
            is_anonymous: false,
            effective_roles,
        }
    }
}

/// Controller → policy table
#[derive(Debug, Default)]
pub struct PolicyRegistry {
    controllers: HashMap<String, ControllerPolicy>,
    role_validator_available: bool,
    default_deny: bool,
}

impl PolicyRegistry {
    /// `role_validator_available` decides whether non-empty role sets may be
    /// registered at all.
    pub fn new(role_validator_available: bool) -> Self {
        Self {
            controllers: HashMap::new(),
            role_validator_available,
            default_deny: false,
        }
    }

    /// Require authentication for actions that no policy covers
    pub fn with_default_deny(mut self, default_deny: bool) -> Self {
        self.default_deny = default_deny;
        self
    }

    pub(crate) fn set_role_validator_available(&mut self, available: bool) {
        self.role_validator_available = available;
    }

    pub(crate) fn set_default_deny(&mut self, default_deny: bool) {
        self.default_deny = default_deny;
    }

    pub fn default_deny(&self) -> bool {
        self.default_deny
    }

    fn ensure_validator(&self, target: &str, roles: &[String]) -> AuthResult<()> {
        if !roles.is_empty() && !self.role_validator_available {
            return Err(AuthError::MissingRoleValidator {
                target: target.to_string(),
            });
        }
        Ok(())
    }

    /// Register class-level roles for `target`
    ///
    /// An empty role set still makes every non-anonymous action of the
    /// controller require authentication.
    pub fn register_class_policy<I, S>(&mut self, target: &str, roles: I) -> AuthResult<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let roles: Vec<String> = roles.into_iter().map(Into::into).collect();
        self.ensure_validator(target, &roles)?;

        let policy = self.controllers.entry(target.to_string()).or_default();
        if policy.class_roles.is_some() {
            return Err(AuthError::duplicate(target, RegistrationKind::ClassPolicy));
        }

        debug!(target = target, roles = ?roles, "Registered class policy");
        policy.class_roles = Some(roles);
        Ok(())
    }

    /// Register roles for a single action of `target`
    pub fn register_action_policy<I, S>(
        &mut self,
        target: &str,
        action: &str,
        roles: I,
    ) -> AuthResult<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let roles: Vec<String> = roles.into_iter().map(Into::into).collect();
        self.ensure_validator(target, &roles)?;

        let policy = self.controllers.entry(target.to_string()).or_default();
        if policy.action_roles.contains_key(action) {
            return Err(AuthError::duplicate(
                format!("{}.{}", target, action),
                RegistrationKind::ActionPolicy,
            ));
        }

        debug!(target = target, action = action, roles = ?roles, "Registered action policy");
        policy.action_roles.insert(action.to_string(), roles);
        Ok(())
    }

    /// Mark an action of `target` as reachable without authentication
    pub fn register_anonymous(&mut self, target: &str, action: &str) -> AuthResult<()> {
        let policy = self.controllers.entry(target.to_string()).or_default();
        if !policy.anonymous_actions.insert(action.to_string()) {
            return Err(AuthError::duplicate(
                format!("{}.{}", target, action),
                RegistrationKind::Anonymous,
            ));
        }

        debug!(target = target, action = action, "Registered anonymous action");
        Ok(())
    }

    /// Register a declarative controller policy from configuration
    pub fn register_config(&mut self, config: &ControllerPolicyConfig) -> AuthResult<()> {
        if let Some(roles) = &config.roles {
            self.register_class_policy(&config.name, roles.iter().cloned())?;
        }
        for (action, roles) in &config.actions {
            self.register_action_policy(&config.name, action, roles.iter().cloned())?;
        }
        for action in &config.anonymous {
            self.register_anonymous(&config.name, action)?;
        }
        Ok(())
    }

    /// Chainable registration for one controller
    pub fn controller(&mut self, target: impl Into<String>) -> ControllerRegistration<'_> {
        ControllerRegistration {
            registry: self,
            target: target.into(),
        }
    }

    /// Resolve the effective policy of `target.action`
    ///
    /// An anonymous marker on the action overrides every role requirement.
    /// Actions covered by neither a class nor an action policy are open
    /// unless default-deny is set.
    pub fn lookup(&self, target: &str, action: &str) -> PolicyLookup {
        let Some(policy) = self.controllers.get(target) else {
            return self.uncovered();
        };

        if policy.anonymous_actions.contains(action) {
            return PolicyLookup::anonymous();
        }

        let action_roles = policy.action_roles.get(action);
        if policy.class_roles.is_none() && action_roles.is_none() {
            return self.uncovered();
        }

        let effective_roles = policy
            .class_roles
            .iter()
            .flatten()
            .chain(action_roles.into_iter().flatten())
            .cloned()
            .collect();
        PolicyLookup::protected(effective_roles)
    }

    fn uncovered(&self) -> PolicyLookup {
        if self.default_deny {
            PolicyLookup::protected(Vec::new())
        } else {
            PolicyLookup::anonymous()
        }
    }

    pub fn get(&self, target: &str) -> Option<&ControllerPolicy> {
        self.controllers.get(target)
    }

    /// Sorted copy of every registered policy
    pub fn snapshot(&self) -> BTreeMap<String, ControllerPolicy> {
        self.controllers
            .iter()
            .map(|(name, policy)| (name.clone(), policy.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.controllers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.controllers.is_empty()
    }
}

/// Registration handle returned by [`PolicyRegistry::controller`]
pub struct ControllerRegistration<'a> {
    registry: &'a mut PolicyRegistry,
    target: String,
}

impl<'a> ControllerRegistration<'a> {
    /// Class-level roles
    pub fn authorize<I, S>(self, roles: I) -> AuthResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.registry.register_class_policy(&self.target, roles)?;
        Ok(self)
    }

    /// Action-level roles
    pub fn action<I, S>(self, action: &str, roles: I) -> AuthResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.registry.register_action_policy(&self.target, action, roles)?;
        Ok(self)
    }

    pub fn allow_anonymous(self, action: &str) -> AuthResult<Self> {
        self.registry.register_anonymous(&self.target, action)?;
        Ok(self)
    }
}
