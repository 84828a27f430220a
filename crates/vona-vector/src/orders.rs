//! Order book used to resolve order matches into their line items

use std::collections::HashMap;

use vona_core::{OrderLine, OrderRecord};

/// Order line items grouped by order uuid
#[derive(Debug, Clone, Default)]
pub struct OrderBook {
    /// Order uuids in first-seen order
    order: Vec<String>,
    lines: HashMap<String, Vec<OrderLine>>,
}

impl OrderBook {
    pub fn new(lines: Vec<OrderLine>) -> Self {
        let mut book = Self::default();
        for line in lines {
            if !book.lines.contains_key(&line.order_uuid) {
                book.order.push(line.order_uuid.clone());
            }
            book.lines.entry(line.order_uuid.clone()).or_default().push(line);
        }
        book
    }

    /// Every line item of one order, empty for unknown orders
    pub fn lines_for(&self, order_uuid: &str) -> &[OrderLine] {
        self.lines.get(order_uuid).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Number of distinct orders
    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// One indexable summary per order
    pub fn summaries(&self) -> Vec<OrderRecord> {
        self.order
            .iter()
            .filter_map(|uuid| {
                let lines = self.lines.get(uuid)?;
                let first = lines.first()?;
                Some(OrderRecord {
                    order_uuid: uuid.clone(),
                    order_id: first.order_id.clone(),
                    status: first.status.clone(),
                    total_amount: first.total_amount,
                    products: lines
                        .iter()
                        .map(|l| l.product_name.as_str())
                        .collect::<Vec<_>>()
                        .join(", "),
                })
            })
            .collect()
    }
}
