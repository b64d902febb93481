use std::sync::Arc;

use crate::{
    config::AppConfig,
    db::{DbPool, OrmConn, create_orm_conn},
    payments::PaymentGateway,
};

#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub orm: OrmConn,
    pub config: Arc<AppConfig>,
    pub payments: PaymentGateway,
}

impl AppState {
    pub fn new(pool: DbPool, config: AppConfig, payments: PaymentGateway) -> Self {
        let orm = create_orm_conn(&pool);
        Self {
            pool,
            orm,
            config: Arc::new(config),
            payments,
        }
    }
}
