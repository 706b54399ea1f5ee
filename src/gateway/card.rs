use serde::Deserialize;

use crate::gateway::mask::{MaskPolicy, Masked};

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Address {
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub address1: Option<String>,
    #[serde(default)]
    pub address2: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub postcode: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

impl Address {
    /// Fills every absent field from `fallback`.
    fn or(&self, fallback: &Address) -> Address {
        fn pick(own: &Option<String>, other: &Option<String>) -> Option<String> {
            own.clone().or_else(|| other.clone())
        }
        Address {
            first_name: pick(&self.first_name, &fallback.first_name),
            last_name: pick(&self.last_name, &fallback.last_name),
            address1: pick(&self.address1, &fallback.address1),
            address2: pick(&self.address2, &fallback.address2),
            city: pick(&self.city, &fallback.city),
            postcode: pick(&self.postcode, &fallback.postcode),
            state: pick(&self.state, &fallback.state),
            country: pick(&self.country, &fallback.country),
            phone: pick(&self.phone, &fallback.phone),
        }
    }
}

/// Card and customer details for a single request.
#[derive(Clone, Default)]
pub struct Card {
    pub holder: Option<String>,
    pub number: Option<String>,
    pub expiry_month: Option<u8>,
    pub expiry_year: Option<u16>,
    pub cvv: Option<String>,
    /// Explicit Sage Pay card type, detected from the number when absent
    pub card_type: Option<String>,
    pub email: Option<String>,
    pub billing: Address,
    pub shipping: Option<Address>,
}

impl std::fmt::Debug for Card {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Card")
            .field("holder", &self.holder)
            .field("number", &self.number.as_deref().map(Masked::mask))
            .field("expiry_month", &self.expiry_month)
            .field("expiry_year", &self.expiry_year)
            .field("cvv", &self.cvv.as_ref().map(|_| "***"))
            .field("card_type", &self.card_type)
            .field("email", &self.email)
            .field("billing", &self.billing)
            .field("shipping", &self.shipping)
            .finish()
    }
}

// Deserialize manually so serde error messages never echo card data
impl<'de> Deserialize<'de> for Card {
    fn deserialize<D>(deserializer: D) -> Result<Card, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct CardShadow {
            #[serde(default)]
            holder: Option<String>,
            #[serde(default)]
            number: Option<String>,
            #[serde(default)]
            expiry_month: Option<u8>,
            #[serde(default)]
            expiry_year: Option<u16>,
            #[serde(default)]
            cvv: Option<String>,
            #[serde(default)]
            card_type: Option<String>,
            #[serde(default)]
            email: Option<String>,
            #[serde(default)]
            billing: Address,
            #[serde(default)]
            shipping: Option<Address>,
        }

        let shadow = CardShadow::deserialize(deserializer)
            .map_err(|_| serde::de::Error::custom("failed to deserialize card data"))?;
        Ok(Card {
            holder: shadow.holder,
            number: shadow.number,
            expiry_month: shadow.expiry_month,
            expiry_year: shadow.expiry_year,
            cvv: shadow.cvv,
            card_type: shadow.card_type,
            email: shadow.email,
            billing: shadow.billing,
            shipping: shadow.shipping,
        })
    }
}

impl Card {
    /// Explicit holder name, otherwise the billing first and last name.
    pub fn holder_name(&self) -> Option<String> {
        if let Some(holder) = self.holder.as_deref().filter(|h| !h.trim().is_empty()) {
            return Some(holder.trim().to_string());
        }
        let name = [&self.billing.first_name, &self.billing.last_name]
            .into_iter()
            .flatten()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        (!name.is_empty()).then_some(name)
    }

    /// Card number with spaces and dashes removed.
    pub fn clean_number(&self) -> Option<String> {
        let number = self.number.as_deref()?;
        let digits: String = number.chars().filter(|c| c.is_ascii_digit()).collect();
        (!digits.is_empty()).then_some(digits)
    }

    /// `MMYY` as expected by the `ExpiryDate` field.
    pub fn expiry_date(&self) -> Option<String> {
        let month = self.expiry_month?;
        let year = self.expiry_year?;
        Some(format!("{:02}{:02}", month, year % 100))
    }

    pub fn card_type(&self) -> Option<String> {
        if let Some(card_type) = &self.card_type {
            return Some(card_type.to_uppercase());
        }
        let number = self.clean_number()?;
        CardBrand::detect(&number).map(|brand| brand.code().to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardBrand {
    Visa,
    Mastercard,
    Discover,
    Amex,
    DinersClub,
    Jcb,
    Maestro,
    Laser,
}

impl CardBrand {
    /// Sage Pay `CardType` value.
    pub fn code(self) -> &'static str {
        match self {
            Self::Visa => "VISA",
            Self::Mastercard => "MC",
            Self::Discover => "DISCOVER",
            Self::Amex => "AMEX",
            Self::DinersClub => "DC",
            Self::Jcb => "JCB",
            Self::Maestro => "MAESTRO",
            Self::Laser => "LASER",
        }
    }

    /// Detects the brand from the digits of a card number.
    pub fn detect(number: &str) -> Option<Self> {
        let len = number.len();
        let prefix = |n: usize| -> Option<u32> { number.get(..n)?.parse().ok() };
        let p1 = prefix(1)?;
        let p2 = prefix(2).unwrap_or_default();
        let p3 = prefix(3).unwrap_or_default();
        let p4 = prefix(4).unwrap_or_default();
        let p6 = prefix(6).unwrap_or_default();

        if p1 == 4 && (len == 13 || len == 16) {
            return Some(Self::Visa);
        }
        if len == 16 && ((51..=55).contains(&p2) || (2221..=2720).contains(&p4) || p6 == 677189)
        {
            return Some(Self::Mastercard);
        }
        if len == 16 && (p4 == 6011 || p2 == 65 || (644..=649).contains(&p3) || p2 == 62) {
            return Some(Self::Discover);
        }
        if len == 15 && (p2 == 34 || p2 == 37) {
            return Some(Self::Amex);
        }
        if len == 14 && ((300..=305).contains(&p3) || p2 == 36 || p2 == 38) {
            return Some(Self::DinersClub);
        }
        if len == 16 && (3528..=3589).contains(&p4) {
            return Some(Self::Jcb);
        }
        if matches!(p4, 6304 | 6706 | 6709 | 6771) && (16..=19).contains(&len) {
            return Some(Self::Laser);
        }
        if (12..=19).contains(&len) && (matches!(p2, 50 | 56 | 57 | 58) || p1 == 6) {
            return Some(Self::Maestro);
        }
        None
    }
}

/// One address group under the gateway's names, without the
/// `Billing` / `Delivery` prefix.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddressFields {
    pub firstnames: Option<String>,
    pub surname: Option<String>,
    pub address1: Option<String>,
    pub address2: Option<String>,
    pub city: Option<String>,
    pub post_code: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
    pub phone: Option<String>,
}

impl AddressFields {
    pub fn from_address(address: &Address) -> Self {
        let mut fields = Self {
            firstnames: address.first_name.clone(),
            surname: address.last_name.clone(),
            address1: address.address1.clone(),
            address2: address.address2.clone(),
            city: address.city.clone(),
            post_code: address.postcode.clone(),
            state: address.state.clone(),
            country: address.country.clone(),
            phone: address.phone.clone(),
        };
        // the gateway rejects a state for anything outside the US
        if fields.country.as_deref() != Some("US") {
            fields.state = Some(String::new());
        }
        fields
    }

    /// `(suffix, value)` pairs, prefixed by the caller with `Billing` or `Delivery`.
    pub fn pairs(&self) -> [(&'static str, Option<&str>); 9] {
        [
            ("Firstnames", self.firstnames.as_deref()),
            ("Surname", self.surname.as_deref()),
            ("Address1", self.address1.as_deref()),
            ("Address2", self.address2.as_deref()),
            ("City", self.city.as_deref()),
            ("PostCode", self.post_code.as_deref()),
            ("State", self.state.as_deref()),
            ("Country", self.country.as_deref()),
            ("Phone", self.phone.as_deref()),
        ]
    }
}

pub fn billing_fields(card: &Card) -> AddressFields {
    AddressFields::from_address(&card.billing)
}

/// Delivery group. Uses billing when `billing_for_shipping` is set or no
/// shipping address was given, absent shipping fields fall back to billing.
pub fn delivery_fields(card: &Card, billing_for_shipping: bool) -> AddressFields {
    match &card.shipping {
        Some(shipping) if !billing_for_shipping => {
            AddressFields::from_address(&shipping.or(&card.billing))
        }
        _ => AddressFields::from_address(&card.billing),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn address(country: &str, state: &str) -> Address {
        Address {
            first_name: Some("Ada".into()),
            last_name: Some("Lovelace".into()),
            address1: Some("1 Analytical Row".into()),
            address2: None,
            city: Some("London".into()),
            postcode: Some("W1 1AA".into()),
            state: Some(state.into()),
            country: Some(country.into()),
            phone: Some("0123".into()),
        }
    }

    fn card(billing: Address, shipping: Option<Address>) -> Card {
        Card {
            number: Some("4929 0000 0000 6".into()),
            expiry_month: Some(3),
            expiry_year: Some(2031),
            cvv: Some("123".into()),
            billing,
            shipping,
            ..Default::default()
        }
    }

    #[test]
    fn state_is_cleared_outside_us() {
        for country in ["GB", "us", "DE", ""] {
            let fields = billing_fields(&card(address(country, "CA"), None));
            assert_eq!(fields.state.as_deref(), Some(""), "country {country}");
        }
        let mut no_country = address("GB", "CA");
        no_country.country = None;
        assert_eq!(
            billing_fields(&card(no_country, None)).state.as_deref(),
            Some("")
        );
    }

    #[test]
    fn state_is_kept_for_us() {
        let fields = billing_fields(&card(address("US", "CA"), None));
        assert_eq!(fields.state.as_deref(), Some("CA"));
    }

    #[test]
    fn delivery_defaults_to_billing() {
        let card = card(address("US", "NY"), None);
        assert_eq!(delivery_fields(&card, false), billing_fields(&card));
    }

    #[test]
    fn billing_for_shipping_overrides_shipping() {
        let card = card(address("GB", ""), Some(address("US", "TX")));
        assert_eq!(delivery_fields(&card, true), billing_fields(&card));
        assert_eq!(delivery_fields(&card, false).state.as_deref(), Some("TX"));
    }

    #[test]
    fn partial_shipping_falls_back_per_field() {
        let shipping = Address {
            address1: Some("2 Difference Lane".into()),
            ..Default::default()
        };
        let card = card(address("GB", ""), Some(shipping));
        let delivery = delivery_fields(&card, false);
        assert_eq!(delivery.address1.as_deref(), Some("2 Difference Lane"));
        assert_eq!(delivery.city.as_deref(), Some("London"));
        assert_eq!(delivery.surname.as_deref(), Some("Lovelace"));
    }

    #[test]
    fn brand_detection() {
        assert_eq!(CardBrand::detect("4929000000006"), Some(CardBrand::Visa));
        assert_eq!(CardBrand::detect("5404000000000001"), Some(CardBrand::Mastercard));
        assert_eq!(CardBrand::detect("2221000000000009"), Some(CardBrand::Mastercard));
        assert_eq!(CardBrand::detect("374200000000004"), Some(CardBrand::Amex));
        assert_eq!(CardBrand::detect("36000000000008"), Some(CardBrand::DinersClub));
        assert_eq!(CardBrand::detect("3569990000000009"), Some(CardBrand::Jcb));
        assert_eq!(CardBrand::detect("6759000000005"), Some(CardBrand::Maestro));
        assert_eq!(CardBrand::detect("1234"), None);
        assert_eq!(CardBrand::detect(""), None);
    }

    #[test]
    fn card_helpers() {
        let card = card(address("GB", ""), None);
        assert_eq!(card.clean_number().as_deref(), Some("4929000000006"));
        assert_eq!(card.expiry_date().as_deref(), Some("0331"));
        assert_eq!(card.card_type().as_deref(), Some("VISA"));
        assert_eq!(card.holder_name().as_deref(), Some("Ada Lovelace"));
    }

    #[test]
    fn card_errors_do_not_leak_number() {
        let err = serde_json::from_value::<Card>(serde_json::json!({
            "number": "4929000000006",
            "expiry_month": "not a month",
        }))
        .unwrap_err();
        assert!(!err.to_string().contains("4929"));
    }

    #[test]
    fn debug_output_is_masked() {
        let debug = format!("{:?}", card(address("GB", ""), None));
        assert!(!debug.contains("4929 0000"));
        assert!(!debug.contains("\"123\""));
    }
}
