//! Authorization for generic resource operations
//!
//! Rules are written as small policy expressions in configuration or on the
//! resource marker and parsed once, at discovery, into [`AuthPolicy`] trees:
//!
//! - `permit_all` (or `public`), `deny_all`
//! - `authenticated`, `service_only`, `admin_only`
//! - `role:<name>`, `any_role:<a>,<b>`
//! - `!<rule>`, and rules joined by `&&` (binds tighter) and `||`
//!
//! For every operation the effective rule is the per-capability override if
//! present, else the resource's base rule, else the global default rule.

use crate::core::capability::Capability;
use crate::core::error::ConfigError;
use anyhow::Result;
use async_trait::async_trait;
use axum::http::HeaderMap;
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

/// Default global rule when configuration does not relax it
pub const DENY_ALL: &str = "deny_all";

/// Authorization context extracted from a request
#[derive(Debug, Clone)]
pub enum AuthContext {
    /// Authenticated user
    User {
        user_id: Uuid,
        tenant_id: Option<Uuid>,
        roles: Vec<String>,
    },

    /// Service-to-service communication
    Service {
        service_name: String,
        tenant_id: Option<Uuid>,
    },

    /// System administrator
    Admin { admin_id: Uuid },

    /// No authentication
    Anonymous,
}

impl AuthContext {
    /// Get tenant_id from context if available
    pub fn tenant_id(&self) -> Option<Uuid> {
        match self {
            AuthContext::User { tenant_id, .. } => *tenant_id,
            AuthContext::Service { tenant_id, .. } => *tenant_id,
            AuthContext::Admin { .. } | AuthContext::Anonymous => None,
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, AuthContext::Admin { .. })
    }

    pub fn is_service(&self) -> bool {
        matches!(self, AuthContext::Service { .. })
    }

    pub fn is_anonymous(&self) -> bool {
        matches!(self, AuthContext::Anonymous)
    }

    /// Get user_id if available
    pub fn user_id(&self) -> Option<Uuid> {
        match self {
            AuthContext::User { user_id, .. } => Some(*user_id),
            _ => None,
        }
    }

    pub fn has_role(&self, role: &str) -> bool {
        match self {
            AuthContext::User { roles, .. } => roles.iter().any(|r| r == role),
            _ => false,
        }
    }
}

/// Everything a rule may look at for one operation
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub principal: AuthContext,
    pub resource: String,
    pub capability: Capability,
    /// Request metadata (lower-cased header names)
    pub metadata: HashMap<String, String>,
}

impl RequestContext {
    pub fn new(principal: AuthContext, resource: &str, capability: Capability) -> Self {
        Self {
            principal,
            resource: resource.to_string(),
            capability,
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, metadata: HashMap<String, String>) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Authorization policy for an operation
#[derive(Debug, Clone)]
pub enum AuthPolicy {
    /// Everyone, including anonymous callers
    PermitAll,

    /// Nobody
    DenyAll,

    /// Any non-anonymous caller
    Authenticated,

    /// User must have one of these roles
    HasRole(Vec<String>),

    /// Service-to-service only
    ServiceOnly,

    /// Admin only
    AdminOnly,

    /// All policies must pass
    And(Vec<AuthPolicy>),

    /// At least one policy must pass
    Or(Vec<AuthPolicy>),

    /// Inverts a policy
    Not(Box<AuthPolicy>),

    /// Host-supplied predicate
    Custom(fn(&RequestContext) -> bool),
}

impl AuthPolicy {
    /// Check if the request satisfies this policy
    pub fn check(&self, context: &RequestContext) -> bool {
        let principal = &context.principal;
        match self {
            AuthPolicy::PermitAll => true,

            AuthPolicy::DenyAll => false,

            AuthPolicy::Authenticated => !principal.is_anonymous(),

            AuthPolicy::HasRole(required) => required.iter().any(|r| principal.has_role(r)),

            AuthPolicy::ServiceOnly => principal.is_service(),

            AuthPolicy::AdminOnly => principal.is_admin(),

            AuthPolicy::And(policies) => policies.iter().all(|p| p.check(context)),

            AuthPolicy::Or(policies) => policies.iter().any(|p| p.check(context)),

            AuthPolicy::Not(policy) => !policy.check(context),

            AuthPolicy::Custom(f) => f(context),
        }
    }

    /// Parse a policy expression
    ///
    /// Unknown atoms are rejected rather than defaulted, so a typo in a rule
    /// can never open a resource.
    pub fn parse(expression: &str) -> Result<Self, ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidSecurityRule {
            expression: expression.to_string(),
            reason: reason.to_string(),
        };

        let alternatives = expression
            .split("||")
            .map(|alternative| {
                let terms = alternative
                    .split("&&")
                    .map(|term| Self::parse_term(term.trim()).map_err(|r| invalid(&r)))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(collapse(terms, AuthPolicy::And))
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;

        Ok(collapse(alternatives, AuthPolicy::Or))
    }

    fn parse_term(term: &str) -> Result<Self, String> {
        if let Some(inner) = term.strip_prefix('!') {
            return Ok(AuthPolicy::Not(Box::new(Self::parse_term(inner.trim())?)));
        }

        match term {
            "" => Err("empty rule".to_string()),
            "permit_all" | "public" => Ok(AuthPolicy::PermitAll),
            "deny_all" => Ok(AuthPolicy::DenyAll),
            "authenticated" => Ok(AuthPolicy::Authenticated),
            "service_only" => Ok(AuthPolicy::ServiceOnly),
            "admin_only" => Ok(AuthPolicy::AdminOnly),
            t => {
                if let Some(role) = t.strip_prefix("role:") {
                    let role = role.trim();
                    if role.is_empty() {
                        return Err("role name is empty".to_string());
                    }
                    Ok(AuthPolicy::HasRole(vec![role.to_string()]))
                } else if let Some(roles) = t.strip_prefix("any_role:") {
                    let roles: Vec<String> = roles
                        .split(',')
                        .map(str::trim)
                        .filter(|r| !r.is_empty())
                        .map(str::to_string)
                        .collect();
                    if roles.is_empty() {
                        return Err("role list is empty".to_string());
                    }
                    Ok(AuthPolicy::HasRole(roles))
                } else {
                    Err(format!("unknown rule '{}'", t))
                }
            }
        }
    }
}

fn collapse(mut policies: Vec<AuthPolicy>, combine: fn(Vec<AuthPolicy>) -> AuthPolicy) -> AuthPolicy {
    if policies.len() == 1 {
        policies.remove(0)
    } else {
        combine(policies)
    }
}

/// A parsed policy together with the text it came from
#[derive(Debug, Clone)]
pub struct SecurityRule {
    expression: String,
    policy: AuthPolicy,
}

impl SecurityRule {
    pub fn parse(expression: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            expression: expression.trim().to_string(),
            policy: AuthPolicy::parse(expression)?,
        })
    }

    /// Wrap a programmatic policy; `label` is what decisions and logs report
    pub fn from_policy(label: &str, policy: AuthPolicy) -> Self {
        Self {
            expression: label.to_string(),
            policy,
        }
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    pub fn policy(&self) -> &AuthPolicy {
        &self.policy
    }
}

/// The rules attached to one resource
#[derive(Debug, Clone, Default)]
pub struct ResourceSecurity {
    pub base: Option<SecurityRule>,
    pub overrides: HashMap<Capability, SecurityRule>,
}

impl ResourceSecurity {
    pub fn with_base(mut self, rule: SecurityRule) -> Self {
        self.base = Some(rule);
        self
    }

    pub fn with_override(mut self, capability: Capability, rule: SecurityRule) -> Self {
        self.overrides.insert(capability, rule);
        self
    }
}

/// Which tier produced the effective rule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleTier {
    Override,
    Base,
    GlobalDefault,
}

impl fmt::Display for RuleTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RuleTier::Override => "override",
            RuleTier::Base => "base",
            RuleTier::GlobalDefault => "default",
        })
    }
}

/// Outcome of one authorization check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityDecision {
    pub allowed: bool,
    pub rule: String,
    pub tier: RuleTier,
}

/// Evaluates resource rules against request contexts
#[derive(Debug, Clone)]
pub struct SecurityEvaluator {
    default_rule: SecurityRule,
}

impl SecurityEvaluator {
    pub fn new(default_rule: SecurityRule) -> Self {
        Self { default_rule }
    }

    pub fn default_rule(&self) -> &SecurityRule {
        &self.default_rule
    }

    /// Pick the effective rule for a capability
    pub fn effective_rule<'a>(
        &'a self,
        security: &'a ResourceSecurity,
        capability: Capability,
    ) -> (&'a SecurityRule, RuleTier) {
        if let Some(rule) = security.overrides.get(&capability) {
            (rule, RuleTier::Override)
        } else if let Some(rule) = &security.base {
            (rule, RuleTier::Base)
        } else {
            (&self.default_rule, RuleTier::GlobalDefault)
        }
    }

    pub fn evaluate(&self, security: &ResourceSecurity, context: &RequestContext) -> SecurityDecision {
        let (rule, tier) = self.effective_rule(security, context.capability);
        SecurityDecision {
            allowed: rule.policy().check(context),
            rule: rule.expression().to_string(),
            tier,
        }
    }
}

impl Default for SecurityEvaluator {
    fn default() -> Self {
        Self::new(SecurityRule::from_policy(DENY_ALL, AuthPolicy::DenyAll))
    }
}

/// Extracts the caller's identity from request headers
///
/// Authentication itself is the host's concern; this is the seam where a
/// host plugs in whatever mechanism it uses.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn extract_context(&self, headers: &HeaderMap) -> Result<AuthContext>;
}

/// Treats every caller as anonymous
pub struct NoAuthProvider;

#[async_trait]
impl AuthProvider for NoAuthProvider {
    async fn extract_context(&self, _headers: &HeaderMap) -> Result<AuthContext> {
        Ok(AuthContext::Anonymous)
    }
}

/// Treats every caller as the same principal (tests and demos)
pub struct StaticAuthProvider(pub AuthContext);

#[async_trait]
impl AuthProvider for StaticAuthProvider {
    async fn extract_context(&self, _headers: &HeaderMap) -> Result<AuthContext> {
        Ok(self.0.clone())
    }
}
