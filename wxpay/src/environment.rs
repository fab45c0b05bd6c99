//! Gateway environments.

use std::fmt::{self, Display, Formatter};

/// Host serving both the production and the sandbox gateway.
pub const GATEWAY_BASE_URL: &str = "https://api.mch.weixin.qq.com/";

/// Path prefix under which the sandbox gateway lives.
pub const SANDBOX_PREFIX: &str = "sandboxnew/";

/// Path of the sandbox sign-key exchange.
pub const SANDBOX_SIGN_KEY_PATH: &str = "sandboxnew/pay/getsignkey";

/// Which gateway a client talks to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Environment {
    /// Test gateway: MD5-only signing with a sandbox-issued key, no mutual TLS.
    #[default]
    Sandbox,
    /// Live gateway.
    Production,
}

impl Environment {
    /// Maps the client's production flag onto an environment.
    #[must_use]
    pub const fn from_production_flag(production: bool) -> Self {
        if production {
            Self::Production
        } else {
            Self::Sandbox
        }
    }

    /// Returns `true` for [`Environment::Production`].
    #[must_use]
    pub const fn is_production(self) -> bool {
        matches!(self, Self::Production)
    }

    /// Lowercase name, used in logs and error messages.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sandbox => "sandbox",
            Self::Production => "production",
        }
    }
}

impl Display for Environment {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<bool> for Environment {
    fn from(production: bool) -> Self {
        Self::from_production_flag(production)
    }
}
