//! Authorization Engine - per-request policy evaluation
//!
//! Resolves the effective policy of the routed controller/action, checks the
//! request identity against it and runs the downstream work only when access
//! is granted. Every request that reaches a decision is audited exactly once,
//! after the downstream work when there is any.

use super::registry::{PolicyLookup, PolicyRegistry};
use crate::{AuthError, AuthResult};
use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, warn};
use warden_core::{
    AuditContext, AuditLogger, AuthorizationConfig, ControllerPolicyConfig, Identity,
    RoleValidator, RouteTarget, UserRecord,
};

/// Engine settings
#[derive(Debug, Clone)]
pub struct AuthorizationOptions {
    /// Where unauthenticated requests are sent
    pub login_url: String,
}

impl From<&AuthorizationConfig> for AuthorizationOptions {
    fn from(config: &AuthorizationConfig) -> Self {
        Self {
            login_url: config.login_url.clone(),
        }
    }
}

/// What the engine needs to know about a request
#[derive(Debug, Clone)]
pub struct AuthorizationRequest {
    pub method: String,
    pub url: String,
    /// `None` when the router could not map the request to a controller
    pub target: Option<RouteTarget>,
    /// The signed-in user, if any
    pub user: Option<UserRecord>,
}

impl AuthorizationRequest {
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
            target: None,
            user: None,
        }
    }

    pub fn with_target(mut self, target: RouteTarget) -> Self {
        self.target = Some(target);
        self
    }

    pub fn with_user(mut self, user: UserRecord) -> Self {
        self.user = Some(user);
        self
    }

    /// Take the user from a resolved identity
    pub fn with_identity(mut self, identity: &Identity) -> Self {
        self.user = identity.user().cloned();
        self
    }

    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }
}

/// Result of evaluating a request against its policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allowed,
    /// Answer 401 and send the client to `redirect`
    Unauthenticated { redirect: String },
    /// Answer 403
    Forbidden,
}

impl Decision {
    /// Short label written to the audit log
    pub fn label(&self) -> &'static str {
        match self {
            Decision::Allowed => "allowed",
            Decision::Unauthenticated { .. } => "unauthenticated",
            Decision::Forbidden => "forbidden",
        }
    }

    pub fn status_code(&self) -> u16 {
        match self {
            Decision::Allowed => 200,
            Decision::Unauthenticated { .. } => 401,
            Decision::Forbidden => 403,
        }
    }
}

/// What happened to a request passed through [`AuthorizationEngine::authorize`]
#[derive(Debug)]
pub enum Outcome<T> {
    /// Access granted and the downstream work returned `T`
    Completed(T),
    Unauthenticated { redirect: String },
    Forbidden,
}

impl<T> Outcome<T> {
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Outcome::Completed(_) => None,
            Outcome::Unauthenticated { .. } => Some(401),
            Outcome::Forbidden => Some(403),
        }
    }
}

/// Builder for [`AuthorizationEngine`]
///
/// Supply the role validator before registering role-bearing policies.
pub struct AuthorizationEngineBuilder {
    options: AuthorizationOptions,
    registry: PolicyRegistry,
    role_validator: Option<Arc<dyn RoleValidator>>,
    audit_logger: Option<Arc<dyn AuditLogger>>,
}

impl AuthorizationEngineBuilder {
    pub fn new(options: AuthorizationOptions) -> Self {
        Self {
            options,
            registry: PolicyRegistry::new(false),
            role_validator: None,
            audit_logger: None,
        }
    }

    pub fn role_validator(mut self, validator: Arc<dyn RoleValidator>) -> Self {
        self.role_validator = Some(validator);
        self.registry.set_role_validator_available(true);
        self
    }

    pub fn audit_logger(mut self, logger: Arc<dyn AuditLogger>) -> Self {
        self.audit_logger = Some(logger);
        self
    }

    pub fn default_deny(mut self, default_deny: bool) -> Self {
        self.registry.set_default_deny(default_deny);
        self
    }

    /// Registry being populated
    pub fn registry_mut(&mut self) -> &mut PolicyRegistry {
        &mut self.registry
    }

    /// Register every declarative controller policy
    pub fn register_all(mut self, controllers: &[ControllerPolicyConfig]) -> AuthResult<Self> {
        for controller in controllers {
            self.registry.register_config(controller)?;
        }
        Ok(self)
    }

    /// Freeze the registry
    pub fn build(self) -> AuthorizationEngine {
        debug!(
            controllers = self.registry.len(),
            default_deny = self.registry.default_deny(),
            "Authorization engine ready"
        );
        AuthorizationEngine {
            registry: self.registry,
            options: self.options,
            role_validator: self.role_validator,
            audit_logger: self.audit_logger,
        }
    }
}

/// Request-time authorization
pub struct AuthorizationEngine {
    registry: PolicyRegistry,
    options: AuthorizationOptions,
    role_validator: Option<Arc<dyn RoleValidator>>,
    audit_logger: Option<Arc<dyn AuditLogger>>,
}

impl AuthorizationEngine {
    pub fn builder(options: AuthorizationOptions) -> AuthorizationEngineBuilder {
        AuthorizationEngineBuilder::new(options)
    }

    /// Build from configuration with the declared controllers registered
    pub fn from_config(
        config: &AuthorizationConfig,
        role_validator: Option<Arc<dyn RoleValidator>>,
        audit_logger: Option<Arc<dyn AuditLogger>>,
    ) -> AuthResult<Self> {
        let mut builder = Self::builder(AuthorizationOptions::from(config))
            .default_deny(config.default_deny);
        if let Some(validator) = role_validator {
            builder = builder.role_validator(validator);
        }
        if let Some(logger) = audit_logger {
            builder = builder.audit_logger(logger);
        }
        Ok(builder.register_all(&config.controllers)?.build())
    }

    pub fn registry(&self) -> &PolicyRegistry {
        &self.registry
    }

    /// Login URL carrying the page to come back to
    ///
    /// The current URL is appended verbatim, without encoding.
    pub fn login_redirect(&self, current_url: &str) -> String {
        format!("{}?redirect={}", self.options.login_url, current_url)
    }

    /// Decide a request without running or auditing anything
    pub async fn decide(
        &self,
        request: &AuthorizationRequest,
    ) -> AuthResult<(Decision, PolicyLookup)> {
        let target = request
            .target
            .as_ref()
            .ok_or_else(|| AuthError::route_unresolved(&request.method, &request.url))?;

        let lookup = self.registry.lookup(&target.controller, &target.action);
        let decision = self.evaluate(target, &lookup, request).await?;
        Ok((decision, lookup))
    }

    async fn evaluate(
        &self,
        target: &RouteTarget,
        lookup: &PolicyLookup,
        request: &AuthorizationRequest,
    ) -> AuthResult<Decision> {
        if lookup.is_anonymous {
            return Ok(Decision::Allowed);
        }

        let Some(user) = request.user.as_ref() else {
            return Ok(Decision::Unauthenticated {
                redirect: self.login_redirect(&request.url),
            });
        };

        if lookup.effective_roles.is_empty() {
            return Ok(Decision::Allowed);
        }

        let Some(validator) = self.role_validator.as_ref() else {
            return Err(AuthError::MissingRoleValidator {
                target: target.to_string(),
            });
        };

        if validator.validate(user, &lookup.effective_roles).await? {
            Ok(Decision::Allowed)
        } else {
            Ok(Decision::Forbidden)
        }
    }

    /// Authorize `request` and run `downstream` if access is granted
    ///
    /// The audit logger runs once the decision is final: after `downstream`
    /// completes, fails or panics when access was granted, immediately
    /// otherwise. Errors and panics from `downstream` propagate after the
    /// audit. Audit failures are logged and swallowed.
    pub async fn authorize<F, Fut, T, E>(
        &self,
        request: &AuthorizationRequest,
        downstream: F,
    ) -> Result<Outcome<T>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<AuthError>,
    {
        let (decision, lookup) = self.decide(request).await?;
        let roles = (!lookup.is_anonymous).then_some(lookup.effective_roles.as_slice());

        debug!(
            method = %request.method,
            url = %request.url,
            decision = decision.label(),
            "Authorization decided"
        );

        match decision {
            Decision::Allowed => {
                let result = AssertUnwindSafe(downstream()).catch_unwind().await;
                self.audit(request, &decision, roles).await;
                match result {
                    Ok(result) => result.map(Outcome::Completed),
                    Err(panic) => std::panic::resume_unwind(panic),
                }
            }
            Decision::Unauthenticated { ref redirect } => {
                self.audit(request, &decision, roles).await;
                Ok(Outcome::Unauthenticated {
                    redirect: redirect.clone(),
                })
            }
            Decision::Forbidden => {
                self.audit(request, &decision, roles).await;
                Ok(Outcome::Forbidden)
            }
        }
    }

    async fn audit(
        &self,
        request: &AuthorizationRequest,
        decision: &Decision,
        roles: Option<&[String]>,
    ) {
        let (Some(logger), Some(target)) = (&self.audit_logger, &request.target) else {
            return;
        };

        let context = AuditContext {
            method: &request.method,
            url: &request.url,
            target,
            user: request.user.as_ref(),
            decision: decision.label(),
        };

        if let Err(e) = logger.log(context, roles).await {
            warn!(
                method = %request.method,
                url = %request.url,
                error = %e,
                "Audit logger failed"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;
    use warden_core::{store_error, WardenResult};

    /// Grants access when the user carries every required role
    struct AllRoles;

    #[async_trait]
    impl RoleValidator for AllRoles {
        async fn validate(&self, user: &UserRecord, roles: &[String]) -> WardenResult<bool> {
            let held = user
                .get("roles")
                .and_then(|v| v.as_array())
                .cloned()
                .unwrap_or_default();
            Ok(roles
                .iter()
                .all(|role| held.iter().any(|h| h.as_str() == Some(role.as_str()))))
        }
    }

    #[derive(Default)]
    struct RecordingAudit {
        entries: Mutex<Vec<(String, Option<Vec<String>>)>>,
        fail: bool,
    }

    #[async_trait]
    impl AuditLogger for RecordingAudit {
        async fn log(
            &self,
            context: AuditContext<'_>,
            roles: Option<&[String]>,
        ) -> WardenResult<()> {
            self.entries
                .lock()
                .unwrap()
                .push((context.decision.to_string(), roles.map(<[String]>::to_vec)));
            if self.fail {
                return Err(store_error!("audit sink down", "audit"));
            }
            Ok(())
        }
    }

    fn engine_with(audit: Arc<RecordingAudit>) -> AuthorizationEngine {
        let mut builder = AuthorizationEngine::builder(AuthorizationOptions {
            login_url: "/login".to_string(),
        })
        .role_validator(Arc::new(AllRoles))
        .audit_logger(audit);

        builder
            .registry_mut()
            .controller("C")
            .authorize(["r"])
            .and_then(|c| c.action("add", ["o"]))
            .and_then(|c| c.allow_anonymous("get"))
            .unwrap();
        builder.build()
    }

    async fn exploding_handler() -> Result<(), AuthError> {
        panic!("boom")
    }

    fn request(action: &str) -> AuthorizationRequest {
        AuthorizationRequest::new("GET", format!("/c/{}", action))
            .with_target(RouteTarget::new("C", action))
    }

    fn user_with_roles(roles: &[&str]) -> UserRecord {
        UserRecord::new("u1").with_field("roles", serde_json::json!(roles))
    }

    #[tokio::test]
    async fn test_anonymous_action_allowed_without_user() {
        let audit = Arc::new(RecordingAudit::default());
        let engine = engine_with(audit.clone());

        let outcome: Outcome<&str> = engine
            .authorize(&request("get"), || async { Ok::<_, AuthError>("ok") })
            .await
            .unwrap();

        assert!(matches!(outcome, Outcome::Completed("ok")));
        let entries = audit.entries.lock().unwrap();
        assert_eq!(entries.as_slice(), &[("allowed".to_string(), None)]);
    }

    #[tokio::test]
    async fn test_unauthenticated_redirects_to_login() {
        let audit = Arc::new(RecordingAudit::default());
        let engine = engine_with(audit.clone());

        let ran = AtomicBool::new(false);
        let outcome: Outcome<()> = engine
            .authorize(&request("add"), || async {
                ran.store(true, Ordering::SeqCst);
                Ok::<_, AuthError>(())
            })
            .await
            .unwrap();
        assert!(!ran.load(Ordering::SeqCst));

        match outcome {
            Outcome::Unauthenticated { redirect } => assert_eq!(redirect, "/login?redirect=/c/add"),
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(audit.entries.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_forbidden_when_roles_missing() {
        let audit = Arc::new(RecordingAudit::default());
        let engine = engine_with(audit.clone());

        let req = request("add").with_user(user_with_roles(&["r"]));
        let outcome: Outcome<()> = engine
            .authorize(&req, || async { Ok::<_, AuthError>(()) })
            .await
            .unwrap();

        assert!(matches!(outcome, Outcome::Forbidden));
        let entries = audit.entries.lock().unwrap();
        assert_eq!(
            entries.as_slice(),
            &[(
                "forbidden".to_string(),
                Some(vec!["r".to_string(), "o".to_string()])
            )]
        );
    }

    #[tokio::test]
    async fn test_allowed_with_all_roles() {
        let engine = engine_with(Arc::new(RecordingAudit::default()));
        let req = request("add").with_user(user_with_roles(&["r", "o"]));

        let (decision, lookup) = engine.decide(&req).await.unwrap();
        assert_eq!(decision, Decision::Allowed);
        assert_eq!(lookup.effective_roles, vec!["r", "o"]);
    }

    #[tokio::test]
    async fn test_unresolved_route_is_error_and_not_audited() {
        let audit = Arc::new(RecordingAudit::default());
        let engine = engine_with(audit.clone());

        let result: Result<Outcome<()>, AuthError> = engine
            .authorize(&AuthorizationRequest::new("GET", "/nowhere"), || async {
                Ok::<(), AuthError>(())
            })
            .await;

        assert!(matches!(result, Err(AuthError::RouteUnresolved { .. })));
        assert!(audit.entries.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_downstream_error_still_audited() {
        let audit = Arc::new(RecordingAudit::default());
        let engine = engine_with(audit.clone());

        let result: Result<Outcome<()>, AuthError> = engine
            .authorize(&request("get"), || async {
                Err::<(), _>(AuthError::route_unresolved("GET", "/inner"))
            })
            .await;

        assert!(result.is_err());
        assert_eq!(audit.entries.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_downstream_panic_still_audited() {
        let audit = Arc::new(RecordingAudit::default());
        let engine = Arc::new(engine_with(audit.clone()));

        let task_engine = engine.clone();
        let joined = tokio::spawn(async move {
            let _: Result<Outcome<()>, AuthError> = task_engine
                .authorize(&request("get"), exploding_handler)
                .await;
        })
        .await;

        assert!(joined.unwrap_err().is_panic());
        assert_eq!(audit.entries.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_audit_failure_is_swallowed() {
        let audit = Arc::new(RecordingAudit {
            fail: true,
            ..Default::default()
        });
        let engine = engine_with(audit.clone());

        let outcome: Outcome<u8> = engine
            .authorize(&request("get"), || async { Ok::<_, AuthError>(7) })
            .await
            .unwrap();
        assert!(matches!(outcome, Outcome::Completed(7)));
    }

    #[tokio::test]
    async fn test_default_open_and_default_deny() {
        let open = AuthorizationEngine::builder(AuthorizationOptions {
            login_url: "/login".to_string(),
        })
        .build();
        let req = AuthorizationRequest::new("GET", "/x").with_target(RouteTarget::new("Z", "any"));
        assert_eq!(open.decide(&req).await.unwrap().0, Decision::Allowed);

        let closed = AuthorizationEngine::builder(AuthorizationOptions {
            login_url: "/login".to_string(),
        })
        .default_deny(true)
        .build();
        assert!(matches!(
            closed.decide(&req).await.unwrap().0,
            Decision::Unauthenticated { .. }
        ));
        let signed_in = req.with_user(UserRecord::new("u1"));
        assert_eq!(closed.decide(&signed_in).await.unwrap().0, Decision::Allowed);
    }

    #[test]
    fn test_from_config_rejects_roles_without_validator() {
        let config = AuthorizationConfig {
            login_url: "/login".to_string(),
            default_deny: false,
            controllers: vec![ControllerPolicyConfig {
                name: "admin".to_string(),
                roles: Some(vec!["admin".to_string()]),
                ..Default::default()
            }],
        };

        let result = AuthorizationEngine::from_config(&config, None, None);
        assert!(matches!(
            result,
            Err(AuthError::MissingRoleValidator { .. })
        ));
    }
}
