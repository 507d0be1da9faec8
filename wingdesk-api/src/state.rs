use std::sync::Arc;
use wingdesk_core::{HistorySink, Repository};
use wingdesk_inventory::{FlightManager, FlightRules};
use wingdesk_sales::{AgentBalance, BookingManager, TicketManager};
use wingdesk_store::BusinessRules;

#[derive(Clone)]
pub struct AuthConfig {
    pub secret: String,
    pub expiration: u64,
}

#[derive(Clone)]
pub struct AppState {
    pub flights: Arc<FlightManager>,
    pub bookings: Arc<BookingManager>,
    pub tickets: Arc<TicketManager>,
    pub balance: Arc<AgentBalance>,
    pub auth: AuthConfig,
}

impl AppState {
    /// Wire every manager onto one repository and history sink.
    pub fn new(
        repo: Arc<dyn Repository>,
        history: Arc<dyn HistorySink>,
        rules: &BusinessRules,
        auth: AuthConfig,
    ) -> Self {
        let flight_rules = FlightRules {
            max_on_sale_days: rules.max_on_sale_days,
        };
        Self {
            flights: Arc::new(FlightManager::new(repo.clone(), history.clone(), flight_rules)),
            bookings: Arc::new(BookingManager::new(repo.clone(), history.clone())),
            tickets: Arc::new(TicketManager::new(
                repo.clone(),
                history.clone(),
                rules.restock_policy,
                rules.default_carrier_code.clone(),
            )),
            balance: Arc::new(AgentBalance::new(repo, history)),
            auth,
        }
    }
}
