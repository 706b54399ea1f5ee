//! Outbound field assembly.
//!
//! Every transaction kind shares the base fields and adds its own. [`build`]
//! is pure: it validates, fills the parameter map and never touches the
//! network.

use std::{collections::BTreeMap, fmt::Display, str::FromStr};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::gateway::{
    GatewayError, Result, basket,
    card::{self, AddressFields, Card},
    config::GatewayConfig,
    reference::{self, TransactionReference},
};

pub const VPS_PROTOCOL: &str = "4.00";

const BROWSER_LANGUAGE: &str = "en-GB";
/// Full screen challenge window
const CHALLENGE_WINDOW_SIZE: &str = "05";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransactionKind {
    Authorize,
    Purchase,
    CompleteAuthorize,
    Capture,
    Void,
    Abort,
    Refund,
    RepeatAuthorize,
    RepeatPurchase,
    TokenRegistration,
    TokenRemoval,
}

impl TransactionKind {
    pub const ALL: [TransactionKind; 11] = [
        Self::Authorize,
        Self::Purchase,
        Self::CompleteAuthorize,
        Self::Capture,
        Self::Void,
        Self::Abort,
        Self::Refund,
        Self::RepeatAuthorize,
        Self::RepeatPurchase,
        Self::TokenRegistration,
        Self::TokenRemoval,
    ];

    /// `TxType` code sent to the gateway.
    pub fn tx_type(self) -> &'static str {
        match self {
            Self::Authorize => "DEFERRED",
            Self::Purchase => "PAYMENT",
            Self::CompleteAuthorize => "DIRECT3DCALLBACK",
            Self::Capture => "RELEASE",
            Self::Void => "VOID",
            Self::Abort => "ABORT",
            Self::Refund => "REFUND",
            Self::RepeatAuthorize => "REPEATDEFERRED",
            Self::RepeatPurchase => "REPEAT",
            Self::TokenRegistration => "TOKEN",
            Self::TokenRemoval => "REMOVETOKEN",
        }
    }

    /// Endpoint path segment, `{service}.vsp`.
    pub fn service(self) -> String {
        self.tx_type().to_lowercase()
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Authorize => "authorize",
            Self::Purchase => "purchase",
            Self::CompleteAuthorize => "complete-authorize",
            Self::Capture => "capture",
            Self::Void => "void",
            Self::Abort => "abort",
            Self::Refund => "refund",
            Self::RepeatAuthorize => "repeat-authorize",
            Self::RepeatPurchase => "repeat-purchase",
            Self::TokenRegistration => "token-registration",
            Self::TokenRemoval => "token-removal",
        }
    }

    /// Kinds that start a new payment and may need a 3-D Secure challenge.
    pub fn is_payment(self) -> bool {
        matches!(self, Self::Authorize | Self::Purchase)
    }
}

impl Display for TransactionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TransactionKind {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.name() == s)
            .ok_or_else(|| GatewayError::invalid(format!("transaction type not defined: {s}")))
    }
}

/// Browser details for 3-D Secure 2.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BrowserInfo {
    #[serde(default)]
    pub javascript_enabled: bool,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub accept_header: Option<String>,
    #[serde(default)]
    pub user_agent: Option<String>,
    #[serde(default)]
    pub challenge_window_size: Option<String>,
    #[serde(default)]
    pub java_enabled: bool,
    #[serde(default)]
    pub color_depth: Option<u8>,
    #[serde(default)]
    pub screen_height: Option<u32>,
    #[serde(default)]
    pub screen_width: Option<u32>,
    /// Minutes from UTC
    #[serde(default)]
    pub timezone: Option<i32>,
}

/// Caller supplied values for one operation. Which ones are required
/// depends on the [`TransactionKind`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TransactionParams {
    #[serde(default)]
    pub amount: Option<Decimal>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// `VendorTxCode` of this transaction
    #[serde(default)]
    pub transaction_id: Option<String>,
    /// Earlier transaction, JSON encoded
    #[serde(default, deserialize_with = "reference::deserialize_encoded")]
    pub transaction_reference: Option<TransactionReference>,
    #[serde(default)]
    pub card: Option<Card>,
    #[serde(default)]
    pub billing_for_shipping: bool,
    /// Stored card token, replaces the card number
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub create_token: bool,
    #[serde(default)]
    pub store_token: Option<bool>,
    #[serde(default)]
    pub return_url: Option<String>,
    #[serde(default)]
    pub notification_url: Option<String>,
    #[serde(default)]
    pub browser: Option<BrowserInfo>,
    #[serde(default)]
    pub items: Vec<basket::Item>,
    #[serde(default)]
    pub vendor_data: Option<String>,
    /// 3-D Secure 2 challenge result posted back by the ACS
    #[serde(default)]
    pub cres: Option<String>,
    /// 3-D Secure 1 merchant data posted back by the ACS
    #[serde(default)]
    pub md: Option<String>,
    /// 3-D Secure 1 authentication result posted back by the ACS
    #[serde(default)]
    pub pares: Option<String>,
}

/// Outbound field map. `None` values go out as empty strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RequestParameters(BTreeMap<String, Option<String>>);

impl RequestParameters {
    pub fn set(&mut self, key: impl Into<String>, value: impl ToString) {
        self.0.insert(key.into(), Some(value.to_string()));
    }

    pub fn set_opt<V: ToString>(&mut self, key: impl Into<String>, value: Option<V>) {
        self.0.insert(key.into(), value.map(|v| v.to_string()));
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|v| v.as_deref())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Form body pairs with every `None` coerced to `""`.
    pub fn to_form(&self) -> Vec<(&str, &str)> {
        self.0
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_deref().unwrap_or_default()))
            .collect()
    }

    fn set_address(&mut self, prefix: &str, fields: &AddressFields) {
        for (name, value) in fields.pairs() {
            self.set_opt(format!("{prefix}{name}"), value);
        }
    }
}

/// Assembles the fields of one request.
pub fn build(
    kind: TransactionKind,
    params: &TransactionParams,
    config: &GatewayConfig,
) -> Result<RequestParameters> {
    if config.vendor.trim().is_empty() {
        return Err(GatewayError::invalid("vendor is not configured"));
    }
    let mut data = base_fields(kind, config);
    match kind {
        TransactionKind::Authorize | TransactionKind::Purchase => {
            payment_fields(&mut data, params, config)?
        }
        TransactionKind::CompleteAuthorize => complete_fields(&mut data, params)?,
        TransactionKind::Capture => capture_fields(&mut data, params)?,
        TransactionKind::Void | TransactionKind::Abort => void_fields(&mut data, params)?,
        TransactionKind::Refund
        | TransactionKind::RepeatAuthorize
        | TransactionKind::RepeatPurchase => related_fields(&mut data, params)?,
        TransactionKind::TokenRegistration => token_registration_fields(&mut data, params)?,
        TransactionKind::TokenRemoval => {
            data.set("Token", required(params.token.as_deref(), "token")?)
        }
    }
    Ok(data)
}

fn base_fields(kind: TransactionKind, config: &GatewayConfig) -> RequestParameters {
    let mut data = RequestParameters::default();
    data.set("VPSProtocol", VPS_PROTOCOL);
    data.set("TxType", kind.tx_type());
    data.set("Vendor", config.vendor.trim());
    data.set("AccountType", config.account_type().code());
    if let Some(language) = config.language_code() {
        data.set("Language", language);
    }
    data
}

fn required<'a>(value: Option<&'a str>, name: &str) -> Result<&'a str> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| GatewayError::invalid(format!("the {name} parameter is required")))
}

/// The rounded amount must stay above zero, `0.004` would go out as `0.00`.
fn positive_amount(params: &TransactionParams) -> Result<String> {
    let amount = params
        .amount
        .ok_or_else(|| GatewayError::invalid("the amount parameter is required"))?;
    if basket::round_amount(amount) <= Decimal::ZERO {
        return Err(GatewayError::invalid(format!(
            "amount must be greater than zero, got {amount}"
        )));
    }
    Ok(basket::format_amount(amount))
}

fn prior_reference(params: &TransactionParams) -> Result<&TransactionReference> {
    let reference = params
        .transaction_reference
        .as_ref()
        .ok_or_else(|| GatewayError::invalid("the transactionReference parameter is required"))?;
    required(reference.vps_tx_id.as_deref(), "VPSTxId")?;
    Ok(reference)
}

fn payment_fields(
    data: &mut RequestParameters,
    params: &TransactionParams,
    config: &GatewayConfig,
) -> Result<()> {
    let amount = positive_amount(params)?;
    let currency = required(params.currency.as_deref(), "currency")?;
    let description = required(params.description.as_deref(), "description")?;
    let transaction_id = required(params.transaction_id.as_deref(), "transactionId")?;
    let card = params
        .card
        .as_ref()
        .ok_or_else(|| GatewayError::invalid("the card parameter is required"))?;

    data.set("Description", description);
    data.set("Amount", amount);
    data.set("Currency", currency.to_uppercase());
    data.set_opt("VendorData", params.vendor_data.as_deref());
    data.set("VendorTxCode", transaction_id);
    data.set_opt("ClientIPAddress", config.client_ip.as_deref());
    data.set("ApplyAVSCV2", u8::from(config.apply_avs_cv2));
    data.set("Apply3DSecure", u8::from(config.apply_3d_secure));
    if let Some(referrer) = &config.referrer_id {
        data.set("ReferrerID", referrer);
    }

    data.set_address("Billing", &card::billing_fields(card));
    data.set_address(
        "Delivery",
        &card::delivery_fields(card, params.billing_for_shipping),
    );
    if let Some(email) = &card.email {
        data.set("CustomerEMail", email);
    }

    if config.use_old_basket_format {
        if let Some(basket) = basket::legacy_basket(&params.items) {
            data.set("Basket", basket);
        }
    } else if let Some(basket) = basket::xml_basket(&params.items)? {
        data.set("BasketXML", basket);
    }

    data.set_opt("CardHolder", card.holder_name());
    match params.token.as_deref().filter(|t| !t.is_empty()) {
        Some(token) => {
            data.set("Token", token);
            data.set("StoreToken", u8::from(params.store_token.unwrap_or(true)));
            data.set_opt("CV2", card.cvv.as_deref());
        }
        None => card_fields(data, card)?,
    }
    if params.create_token {
        data.set("CreateToken", 1);
    }

    browser_fields(data, params);
    Ok(())
}

fn card_fields(data: &mut RequestParameters, card: &Card) -> Result<()> {
    let number = card
        .clean_number()
        .ok_or_else(|| GatewayError::invalid("the card number is required"))?;
    let expiry = card
        .expiry_date()
        .ok_or_else(|| GatewayError::invalid("the card expiry date is required"))?;
    data.set_opt("CardType", card.card_type());
    data.set("CardNumber", number);
    data.set("ExpiryDate", expiry);
    data.set_opt("CV2", card.cvv.as_deref());
    Ok(())
}

fn browser_fields(data: &mut RequestParameters, params: &TransactionParams) {
    let browser = params.browser.clone().unwrap_or_default();
    data.set_opt(
        "ThreeDSNotificationURL",
        params
            .notification_url
            .as_deref()
            .or(params.return_url.as_deref()),
    );
    data.set("BrowserJavascriptEnabled", u8::from(browser.javascript_enabled));
    data.set(
        "BrowserLanguage",
        browser.language.as_deref().unwrap_or(BROWSER_LANGUAGE),
    );
    data.set_opt("BrowserAcceptHeader", browser.accept_header.as_deref());
    data.set_opt("BrowserUserAgent", browser.user_agent.as_deref());
    data.set(
        "ChallengeWindowSize",
        browser
            .challenge_window_size
            .as_deref()
            .unwrap_or(CHALLENGE_WINDOW_SIZE),
    );
    if browser.javascript_enabled {
        data.set("BrowserJavaEnabled", u8::from(browser.java_enabled));
        data.set_opt("BrowserColorDepth", browser.color_depth);
        data.set_opt("BrowserScreenHeight", browser.screen_height);
        data.set_opt("BrowserScreenWidth", browser.screen_width);
        data.set_opt("BrowserTZ", browser.timezone);
    }
}

fn complete_fields(data: &mut RequestParameters, params: &TransactionParams) -> Result<()> {
    let transaction_id = required(params.transaction_id.as_deref(), "transactionId")?;
    data.set("VendorTxCode", transaction_id);
    if let Some(vps_tx_id) = params
        .transaction_reference
        .as_ref()
        .and_then(|r| r.vps_tx_id.as_deref())
    {
        data.set("VPSTxId", vps_tx_id);
    }
    if let Some(cres) = &params.cres {
        data.set("CRes", cres);
    } else if let Some(pares) = &params.pares {
        data.set("PARes", pares);
        data.set_opt("MD", params.md.as_deref());
    }
    Ok(())
}

fn capture_fields(data: &mut RequestParameters, params: &TransactionParams) -> Result<()> {
    let reference = prior_reference(params)?;
    let amount = positive_amount(params)?;
    reference_fields(data, reference);
    data.set("ReleaseAmount", amount);
    Ok(())
}

fn void_fields(data: &mut RequestParameters, params: &TransactionParams) -> Result<()> {
    reference_fields(data, prior_reference(params)?);
    Ok(())
}

fn reference_fields(data: &mut RequestParameters, reference: &TransactionReference) {
    data.set_opt("VPSTxId", reference.vps_tx_id.as_deref());
    data.set_opt("VendorTxCode", reference.vendor_tx_code.as_deref());
    data.set_opt("SecurityKey", reference.security_key.as_deref());
    data.set_opt("TxAuthNo", reference.tx_auth_no.as_deref());
}

/// Refund and repeat payments: a new transaction pointing at an older one.
fn related_fields(data: &mut RequestParameters, params: &TransactionParams) -> Result<()> {
    let reference = prior_reference(params)?;
    let amount = positive_amount(params)?;
    let currency = required(params.currency.as_deref(), "currency")?;
    let description = required(params.description.as_deref(), "description")?;
    let transaction_id = required(params.transaction_id.as_deref(), "transactionId")?;

    data.set("Amount", amount);
    data.set("Currency", currency.to_uppercase());
    data.set("Description", description);
    data.set("VendorTxCode", transaction_id);
    data.set_opt("RelatedVPSTxId", reference.vps_tx_id.as_deref());
    data.set_opt("RelatedVendorTxCode", reference.vendor_tx_code.as_deref());
    data.set_opt("RelatedSecurityKey", reference.security_key.as_deref());
    data.set_opt("RelatedTxAuthNo", reference.tx_auth_no.as_deref());
    Ok(())
}

fn token_registration_fields(
    data: &mut RequestParameters,
    params: &TransactionParams,
) -> Result<()> {
    let card = params
        .card
        .as_ref()
        .ok_or_else(|| GatewayError::invalid("the card parameter is required"))?;
    data.set_opt("Currency", params.currency.as_deref().map(str::to_uppercase));
    data.set_opt("CardHolder", card.holder_name());
    card_fields(data, card)
}
