//! Shopping basket encoding.
//!
//! Sage Pay accepts the basket either as `BasketXML` or in the older colon
//! delimited `Basket` format. Each format, and discount lines, come with their
//! own set of allowed characters for names.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::gateway::{GatewayError, Result};

const NAME_MAX_LEN: usize = 100;

const ITEM_NAME_SPECIALS: &str = " +'/\\&:,.-{}";
const NON_XML_ITEM_NAME_SPECIALS: &str = " +'/\\,.-{};_@()^\"~$=!#?|[]";
const DISCOUNT_NAME_SPECIALS: &str = " +'/\\:,.-{};_@()^\"~[]$=!#?|";

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Item {
    pub name: String,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
    /// Unit price without tax. Negative prices are discounts.
    pub price: Decimal,
    #[serde(default)]
    pub vat: Decimal,
}

fn default_quantity() -> u32 {
    1
}

fn filter_name(name: &str, specials: &str) -> String {
    let filtered: String = name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || specials.contains(*c))
        .take(NAME_MAX_LEN)
        .collect();
    filtered.trim().to_string()
}

/// Item name for `BasketXML`.
pub fn filter_item_name(name: &str) -> String {
    filter_name(name, ITEM_NAME_SPECIALS)
}

/// Item name for the colon delimited `Basket`.
pub fn filter_non_xml_item_name(name: &str) -> String {
    filter_name(name, NON_XML_ITEM_NAME_SPECIALS)
}

/// Discount description for `BasketXML`.
pub fn filter_discount_name(name: &str) -> String {
    filter_name(name, DISCOUNT_NAME_SPECIALS)
}

/// Amount as it goes on the wire, half away from zero to two places.
pub fn round_amount(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Two decimal places, `.` separator, no grouping.
pub fn format_amount(amount: Decimal) -> String {
    format!("{:.2}", round_amount(amount))
}

#[derive(Debug, Serialize)]
struct XmlBasket {
    item: Vec<XmlItem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    discounts: Option<XmlDiscounts>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct XmlItem {
    description: String,
    quantity: u32,
    unit_net_amount: String,
    unit_tax_amount: String,
    unit_gross_amount: String,
    total_gross_amount: String,
}

#[derive(Debug, Serialize)]
struct XmlDiscounts {
    discount: Vec<XmlDiscount>,
}

#[derive(Debug, Serialize)]
struct XmlDiscount {
    fixed: String,
    description: String,
}

/// `BasketXML` value, `None` without items.
pub fn xml_basket(items: &[Item]) -> Result<Option<String>> {
    if items.is_empty() {
        return Ok(None);
    }
    let (discounts, lines): (Vec<&Item>, Vec<&Item>) =
        items.iter().partition(|item| item.price.is_sign_negative());

    let item = lines
        .into_iter()
        .map(|line| {
            let gross = line.price + line.vat;
            XmlItem {
                description: filter_item_name(&line.name),
                quantity: line.quantity,
                unit_net_amount: format_amount(line.price),
                unit_tax_amount: format_amount(line.vat),
                unit_gross_amount: format_amount(gross),
                total_gross_amount: format_amount(gross * Decimal::from(line.quantity)),
            }
        })
        .collect();

    let discounts = (!discounts.is_empty()).then(|| XmlDiscounts {
        discount: discounts
            .into_iter()
            .map(|line| XmlDiscount {
                fixed: format_amount(-(line.price * Decimal::from(line.quantity))),
                description: filter_discount_name(&line.name),
            })
            .collect(),
    });

    let basket = XmlBasket { item, discounts };
    quick_xml::se::to_string_with_root("basket", &basket)
        .map(Some)
        .map_err(|e| GatewayError::invalid(format!("basket is not encodable: {e}")))
}

/// Colon delimited `Basket` value, `None` without items.
///
/// `lines:description:quantity:unit net:unit tax:unit gross:line gross` per item.
pub fn legacy_basket(items: &[Item]) -> Option<String> {
    if items.is_empty() {
        return None;
    }
    let mut basket = items.len().to_string();
    for item in items {
        let gross = item.price + item.vat;
        basket.push_str(&format!(
            ":{}:{}:{}:{}:{}:{}",
            filter_non_xml_item_name(&item.name),
            item.quantity,
            format_amount(item.price),
            format_amount(item.vat),
            format_amount(gross),
            format_amount(gross * Decimal::from(item.quantity)),
        ));
    }
    Some(basket)
}
