//! Static product and store catalog.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::domain::KEY_SEPARATOR;
use crate::{Error, Result};

/// A watched product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    /// Subject id; also shown as the SKU in alerts.
    pub sku: String,
    pub name: String,
    #[serde(default)]
    pub url: String,
    /// Spec lines shown in alerts, in key order.
    #[serde(default)]
    pub specs: BTreeMap<String, String>,
}

impl Product {
    /// `[name](url)` when a URL is known, plain name otherwise.
    pub fn markdown_link(&self) -> String {
        if self.url.trim().is_empty() {
            self.name.clone()
        } else {
            format!("[{}]({})", self.name, self.url.trim())
        }
    }
}

/// A store location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Store {
    pub id: String,
    pub name: String,
}

/// The products and stores checked every cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    pub products: Vec<Product>,
    #[serde(default)]
    pub stores: Vec<Store>,
}

impl Catalog {
    /// Read and validate a catalog file.
    pub async fn load(path: &Path) -> Result<Self> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| Error::io_path("reading catalog", path, e))?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let mut catalog: Self = serde_json::from_str(raw)
            .map_err(|e| Error::config(format!("invalid catalog: {}", e)))?;
        catalog.normalize();
        catalog.validate()?;
        Ok(catalog)
    }

    /// Ids become keys, so surrounding whitespace is dropped before anything uses them.
    fn normalize(&mut self) {
        for product in &mut self.products {
            product.sku = product.sku.trim().to_string();
        }
        for store in &mut self.stores {
            store.id = store.id.trim().to_string();
        }
    }

    /// Ids must be non-empty and unique; product ids must not contain the key separator.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for product in &self.products {
            let sku = product.sku.trim();
            if sku.is_empty() {
                return Err(Error::config(format!(
                    "product '{}' has an empty sku",
                    product.name
                )));
            }
            if sku.contains(KEY_SEPARATOR) {
                return Err(Error::config(format!(
                    "product sku '{}' must not contain '{}'",
                    sku, KEY_SEPARATOR
                )));
            }
            if !seen.insert(sku) {
                return Err(Error::config(format!("duplicate product sku '{}'", sku)));
            }
        }

        let mut seen = HashSet::new();
        for store in &self.stores {
            let id = store.id.trim();
            if id.is_empty() {
                return Err(Error::config(format!("store '{}' has an empty id", store.name)));
            }
            if !seen.insert(id) {
                return Err(Error::config(format!("duplicate store id '{}'", id)));
            }
        }
        Ok(())
    }

    pub fn product(&self, sku: &str) -> Option<&Product> {
        self.products.iter().find(|p| p.sku == sku)
    }

    pub fn store(&self, id: &str) -> Option<&Store> {
        self.stores.iter().find(|s| s.id == id)
    }

    /// Display name for a store id, falling back to the id itself.
    pub fn store_name<'a>(&'a self, id: &'a str) -> &'a str {
        self.store(id).map(|s| s.name.as_str()).unwrap_or(id)
    }

    /// Every (product, store) pair in catalog order.
    pub fn pairs(&self) -> impl Iterator<Item = (&Product, &Store)> {
        self.products
            .iter()
            .flat_map(move |p| self.stores.iter().map(move |s| (p, s)))
    }

    pub fn checks_per_cycle(&self) -> usize {
        self.products.len() * self.stores.len()
    }
}
