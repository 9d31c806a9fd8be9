/// User accounts and authentication.
pub const USER_SERVICE: &str = "user-service";
/// Product catalogue.
pub const PRODUCT_SERVICE: &str = "product-service";
/// Order placement and payment.
pub const ORDER_SERVICE: &str = "order-service";
/// Outbound notifications.
pub const NOTIFICATION_SERVICE: &str = "notification-service";
/// Public API gateway.
pub const GATEWAY_SERVICE: &str = "gateway-service";

/// Every known service in catalogue order.
pub const KNOWN_SERVICES: [&str; 5] = [
    USER_SERVICE,
    PRODUCT_SERVICE,
    ORDER_SERVICE,
    NOTIFICATION_SERVICE,
    GATEWAY_SERVICE,
];

const CRITICAL: [&str; 3] = [GATEWAY_SERVICE, USER_SERVICE, ORDER_SERVICE];
const ISOLATABLE: [&str; 2] = [PRODUCT_SERVICE, NOTIFICATION_SERVICE];

/// Static facts about the service catalogue.
#[derive(Debug, Clone, Copy, Default)]
pub struct ServiceCatalogue;

impl ServiceCatalogue {
    /// All known services as owned identifiers.
    #[must_use]
    pub fn all() -> Vec<String> {
        KNOWN_SERVICES.iter().map(|s| (*s).to_string()).collect()
    }

    /// Position in catalogue order; unknown services sort last.
    #[must_use]
    pub fn rank(service: &str) -> usize {
        KNOWN_SERVICES
            .iter()
            .position(|known| *known == service)
            .unwrap_or(KNOWN_SERVICES.len())
    }

    /// Services whose outage takes user-facing flows down.
    #[must_use]
    pub fn is_critical(service: &str) -> bool {
        CRITICAL.contains(&service)
    }

    /// Services that can be fenced off without cascading failures.
    #[must_use]
    pub fn is_isolatable(service: &str) -> bool {
        ISOLATABLE.contains(&service)
    }

    /// Approximate number of public endpoints exposed by a service.
    #[must_use]
    pub fn endpoint_count(service: &str) -> u32 {
        match service {
            GATEWAY_SERVICE => 10,
            USER_SERVICE | ORDER_SERVICE => 8,
            PRODUCT_SERVICE | NOTIFICATION_SERVICE => 6,
            _ => 5,
        }
    }
}
