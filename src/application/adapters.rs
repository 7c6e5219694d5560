//! Concrete storefront adapters

pub mod magento;
pub mod shopify;
pub mod woocommerce;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

pub use magento::MagentoAdapter;
pub use shopify::ShopifyAdapter;
pub use woocommerce::WooCommerceAdapter;

use super::site_adapter::SiteAdapter;
use crate::domain::errors::CrawlError;
use crate::infrastructure::parsing::ParsingResult;

/// Storefront family named by a site entry's `adapter` field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SiteKind {
    WooCommerce,
    Magento,
    Shopify,
}

impl SiteKind {
    pub fn adapter(self) -> ParsingResult<Arc<dyn SiteAdapter>> {
        Ok(match self {
            Self::WooCommerce => Arc::new(WooCommerceAdapter::new()?),
            Self::Magento => Arc::new(MagentoAdapter::new()?),
            Self::Shopify => Arc::new(ShopifyAdapter::new()?),
        })
    }
}

impl FromStr for SiteKind {
    type Err = CrawlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "woocommerce" | "woo" => Ok(Self::WooCommerce),
            "magento" => Ok(Self::Magento),
            "shopify" => Ok(Self::Shopify),
            other => Err(CrawlError::InvalidJobConfig {
                reason: format!("unknown site adapter '{other}'"),
            }),
        }
    }
}

impl fmt::Display for SiteKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::WooCommerce => "woocommerce",
            Self::Magento => "magento",
            Self::Shopify => "shopify",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_kind_builds_an_adapter() {
        for kind in [SiteKind::WooCommerce, SiteKind::Magento, SiteKind::Shopify] {
            let adapter = kind.adapter().unwrap();
            assert_eq!(adapter.name(), kind.to_string());
        }
    }

    #[test]
    fn parses_adapter_names() {
        assert_eq!("WooCommerce".parse::<SiteKind>().unwrap(), SiteKind::WooCommerce);
        assert_eq!(" shopify ".parse::<SiteKind>().unwrap(), SiteKind::Shopify);
        assert!("prestashop".parse::<SiteKind>().is_err());
    }
}
