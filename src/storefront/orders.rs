use crate::dto::orders::OrderDetail;

#[derive(Debug, Clone, Default)]
pub struct OrderState {
    pub orders: Vec<OrderDetail>,
    pub current_order: Option<OrderDetail>,
    pub is_loading: bool,
    pub error: Option<String>,
}

impl OrderState {
    pub fn set_current_order(&mut self, order: Option<OrderDetail>) {
        self.current_order = order;
    }

    pub fn clear_current_order(&mut self) {
        self.current_order = None;
    }

    pub fn set_error(&mut self, error: impl Into<String>) {
        self.error = Some(error.into());
    }

    pub fn clear_error(&mut self) {
        self.error = None;
    }

    pub fn set_orders(&mut self, orders: Vec<OrderDetail>) {
        self.orders = orders;
    }

    /// Newest first; the added order becomes current.
    pub fn add_order(&mut self, order: OrderDetail) {
        self.orders.insert(0, order.clone());
        self.current_order = Some(order);
    }

    pub fn update_order(&mut self, order: OrderDetail) {
        if let Some(existing) = self
            .orders
            .iter_mut()
            .find(|o| o.order.id == order.order.id)
        {
            *existing = order.clone();
        }
        if self
            .current_order
            .as_ref()
            .is_some_and(|c| c.order.id == order.order.id)
        {
            self.current_order = Some(order);
        }
    }

    pub fn set_loading(&mut self, loading: bool) {
        self.is_loading = loading;
    }
}
