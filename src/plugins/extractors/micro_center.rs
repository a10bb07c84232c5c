use scraper::{ElementRef, Html, Selector};

use crate::plugins::traits::{Availability, AvailabilityExtractor};
use crate::utils::error::ExtractionError;

const TITLE_SUFFIX: &str = " - Micro Center";

const OUT_OF_STOCK_PHRASES: [&str; 5] = [
    "sold out",
    "out of stock",
    "not in stock",
    "not available",
    "unavailable",
];

/// Availability strategy for Micro Center product pages.
///
/// The store is selected through the `storeSelected` cookie, so the page is
/// normally already scoped to one store. When the page renders per-store
/// blocks (`[data-store-id]`), only the block for the requested store is read.
pub struct MicroCenterExtractor {
    title_selector: Selector,
    store_section_selector: Selector,
    add_to_cart_selector: Selector,
    inventory_selector: Selector,
}

impl Default for MicroCenterExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl MicroCenterExtractor {
    pub fn new() -> Self {
        MicroCenterExtractor {
            title_selector: Selector::parse(r#"meta[property="og:title"]"#).expect("valid og:title selector"),
            store_section_selector: Selector::parse("[data-store-id]").expect("valid store selector"),
            add_to_cart_selector: Selector::parse(r#"button[data-name="Add to Cart"]"#)
                .expect("valid add-to-cart selector"),
            inventory_selector: Selector::parse("div.inventory").expect("valid inventory selector"),
        }
    }

    fn extract_title(&self, document: &Html) -> Option<String> {
        let content = document
            .select(&self.title_selector)
            .next()?
            .value()
            .attr("content")?;
        let title = content.replace(TITLE_SUFFIX, "").trim().to_string();
        if title.is_empty() { None } else { Some(title) }
    }

    fn store_scope<'a>(&self, document: &'a Html, store_number: &str) -> Result<ElementRef<'a>, ExtractionError> {
        let mut sections = document.select(&self.store_section_selector).peekable();
        if sections.peek().is_none() {
            return Ok(document.root_element());
        }

        sections
            .find(|section| section.value().attr("data-store-id").map(str::trim) == Some(store_number))
            .ok_or_else(|| ExtractionError::StoreNotFound {
                store_number: store_number.to_string(),
            })
    }

    /// Indicators in order of reliability: an enabled add-to-cart button, the
    /// inventory block text, then any out-of-stock wording in the scope.
    fn read_indicators(&self, scope: ElementRef<'_>) -> Option<bool> {
        if let Some(button) = scope.select(&self.add_to_cart_selector).next() {
            let element = button.value();
            let disabled = element.classes().any(|class| class == "disabled") || element.attr("disabled").is_some();
            if !disabled {
                return Some(true);
            }
        }

        let inventories = std::iter::once(scope)
            .filter(|element| self.inventory_selector.matches(element))
            .chain(scope.select(&self.inventory_selector));
        for inventory in inventories {
            let text = normalized_text(inventory);
            // "in stock" wins over unrelated wording such as "delivery unavailable".
            if text.contains("in stock") && !text.contains("out of stock") && !text.contains("not in stock") {
                return Some(true);
            }
            if contains_out_of_stock_phrase(&text) {
                return Some(false);
            }
        }

        if contains_out_of_stock_phrase(&normalized_text(scope)) {
            return Some(false);
        }

        None
    }
}

fn normalized_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .collect::<Vec<_>>()
        .join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn contains_out_of_stock_phrase(text: &str) -> bool {
    OUT_OF_STOCK_PHRASES.iter().any(|phrase| text.contains(phrase))
}

impl AvailabilityExtractor for MicroCenterExtractor {
    fn name(&self) -> &str {
        "micro_center"
    }

    fn extract_stock(&self, content: &str, store_number: &str) -> Result<Availability, ExtractionError> {
        let document = Html::parse_document(content);
        let title = self.extract_title(&document);
        let scope = self.store_scope(&document, store_number)?;

        match self.read_indicators(scope) {
            Some(in_stock) => Ok(Availability { in_stock, title }),
            None => Err(ExtractionError::StructureChanged(format!(
                "no availability indicator found for store {}",
                store_number
            ))),
        }
    }
}
