use serde::{Deserialize, Serialize};

/// Gateway settings supplied by the host platform with every request.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct GatewayConfig {
    pub vendor: String,
    #[serde(default)]
    pub client_ip: Option<String>,
    #[serde(default)]
    pub test_mode: bool,
    /// ISO 639 code or a locale such as `en-GB`
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default, rename = "threeds_option")]
    pub apply_3d_secure: Apply3DSecure,
    #[serde(default)]
    pub apply_avs_cv2: ApplyAvsCv2,
    #[serde(default)]
    pub account_type: Option<AccountType>,
    #[serde(default)]
    pub referrer_id: Option<String>,
    /// Send the colon delimited `Basket` field instead of `BasketXML`
    #[serde(default)]
    pub use_old_basket_format: bool,
}

impl GatewayConfig {
    /// Upper cased language code, locales are cut at the first `-` or `_`.
    pub fn language_code(&self) -> Option<String> {
        let language = self.language.as_deref()?.trim();
        let code = language
            .split(['-', '_'])
            .next()
            .unwrap_or_default()
            .to_uppercase();
        (!code.is_empty()).then_some(code)
    }

    pub fn account_type(&self) -> AccountType {
        self.account_type.unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
pub enum AccountType {
    /// e-commerce merchant account
    #[default]
    E,
    /// mail order / telephone order account
    M,
    /// continuous authority account
    C,
}

impl AccountType {
    pub fn code(self) -> &'static str {
        match self {
            Self::E => "E",
            Self::M => "M",
            Self::C => "C",
        }
    }
}

/// `Apply3DSecure` flag. Stored by the host settings page as a number.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Apply3DSecure {
    /// Check when possible and apply the account rules.
    #[default]
    Apply,
    /// Force the check and apply the account rules.
    Force,
    /// Never check, always authorise.
    None,
    /// Force the check and always obtain an auth code.
    Auth,
}

impl TryFrom<u8> for Apply3DSecure {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Apply),
            1 => Ok(Self::Force),
            2 => Ok(Self::None),
            3 => Ok(Self::Auth),
            other => Err(format!("unknown 3-D Secure option {other}")),
        }
    }
}

impl From<Apply3DSecure> for u8 {
    fn from(value: Apply3DSecure) -> Self {
        match value {
            Apply3DSecure::Apply => 0,
            Apply3DSecure::Force => 1,
            Apply3DSecure::None => 2,
            Apply3DSecure::Auth => 3,
        }
    }
}

/// `ApplyAVSCV2` flag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum ApplyAvsCv2 {
    #[default]
    Default,
    Force,
    Off,
    ForceNoRules,
}

impl TryFrom<u8> for ApplyAvsCv2 {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Default),
            1 => Ok(Self::Force),
            2 => Ok(Self::Off),
            3 => Ok(Self::ForceNoRules),
            other => Err(format!("unknown AVS/CV2 option {other}")),
        }
    }
}

impl From<ApplyAvsCv2> for u8 {
    fn from(value: ApplyAvsCv2) -> Self {
        match value {
            ApplyAvsCv2::Default => 0,
            ApplyAvsCv2::Force => 1,
            ApplyAvsCv2::Off => 2,
            ApplyAvsCv2::ForceNoRules => 3,
        }
    }
}
