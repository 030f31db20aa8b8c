/// In-memory cart ledger with quantity coalescing
///
/// Lines are identified by (item, variant, spice level); adding a duplicate
/// key increments the existing quantity instead of inserting a second line.
/// Money is integer paisa end to end and becomes a decimal string only at
/// display boundaries.

use crate::error::{ClientError, Result};
use serde::{Deserialize, Serialize};

/// Minor currency unit (1 rupee = 100 paisa)
pub type Paisa = i64;

/// Render a paisa amount as a decimal rupee string for display
pub fn format_rupees(amount: Paisa) -> String {
    let sign = if amount < 0 { "-" } else { "" };
    let magnitude = amount.unsigned_abs();
    format!("{}Rs {}.{:02}", sign, magnitude / 100, magnitude % 100)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpiceLevel {
    Mild,
    Medium,
    Hot,
    ExtraHot,
}

/// One cart line. Identity key is (item_id, variant_label, spice_level).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub item_id: i64,
    pub variant_label: String,
    pub spice_level: SpiceLevel,
    pub quantity: u32,
    /// Unit price in paisa
    pub unit_price: Paisa,
}

impl CartLine {
    fn same_identity(&self, other: &CartLine) -> bool {
        self.item_id == other.item_id
            && self.variant_label == other.variant_label
            && self.spice_level == other.spice_level
    }
}

/// Where a checkout was initiated from. Carried as a closed variant so the
/// order builder can match exhaustively instead of probing optional fields.
#[derive(Debug, Clone, PartialEq)]
pub enum CheckoutOrigin {
    /// Regular checkout of the whole cart
    FromCart,
    /// "Buy now" on a single item, bypassing the cart
    FromDirectBuy(CartLine),
}

/// Order placement payload sent to the backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRequest {
    pub lines: Vec<CartLine>,
    pub total_paisa: Paisa,
}

#[derive(Debug, Default)]
pub struct CartLedger {
    lines: Vec<CartLine>,
}

impl CartLedger {
    pub fn new() -> Self {
        CartLedger { lines: Vec::new() }
    }

    /// Add a line, coalescing into an existing line with the same identity
    /// key. Returns the resulting full line list.
    pub fn add_line(&mut self, candidate: CartLine) -> &[CartLine] {
        match self.lines.iter_mut().find(|line| line.same_identity(&candidate)) {
            Some(existing) => existing.quantity += candidate.quantity,
            None => self.lines.push(candidate),
        }
        &self.lines
    }

    /// Wholesale substitution with the backend's authoritative cart; no merge
    pub fn replace_all(&mut self, lines: Vec<CartLine>) {
        self.lines = lines;
    }

    pub fn clear(&mut self) {
        self.lines.clear();
    }

    pub fn lines(&self) -> &[CartLine] {
        &self.lines
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Exact integer sum of quantity * unit_price across all lines
    pub fn total(&self) -> Paisa {
        self.lines
            .iter()
            .map(|line| Paisa::from(line.quantity) * line.unit_price)
            .sum()
    }

    /// Build the order payload for a checkout.
    ///
    /// `FromCart` checks out every line in the ledger and rejects an empty
    /// cart; `FromDirectBuy` checks out exactly the carried line and
    /// ignores the ledger.
    pub fn checkout_payload(&self, origin: CheckoutOrigin) -> Result<OrderRequest> {
        let lines = match origin {
            CheckoutOrigin::FromCart => {
                if self.lines.is_empty() {
                    return Err(ClientError::Validation("Cart is empty".to_string()));
                }
                self.lines.clone()
            }
            CheckoutOrigin::FromDirectBuy(line) => vec![line],
        };

        let total_paisa = lines
            .iter()
            .map(|line| Paisa::from(line.quantity) * line.unit_price)
            .sum();

        Ok(OrderRequest { lines, total_paisa })
    }
}
