//! Order state machine as sellers, admins and the settlement path see it.

use agora_core::OrderStatus;
use agora_web::routes::orders::seller_next;

const ALL: [OrderStatus; 6] = [
    OrderStatus::Pending,
    OrderStatus::Paid,
    OrderStatus::Shipped,
    OrderStatus::Delivered,
    OrderStatus::Cancelled,
    OrderStatus::Refunded,
];

#[test]
fn test_happy_path_is_reachable() {
    let path = [
        OrderStatus::Pending,
        OrderStatus::Paid,
        OrderStatus::Shipped,
        OrderStatus::Delivered,
    ];
    for pair in path.windows(2) {
        if let [from, to] = pair {
            assert!(from.can_transition_to(*to), "{from} -> {to}");
        }
    }
}

#[test]
fn test_terminal_states_go_nowhere() {
    for from in ALL.into_iter().filter(|s| s.is_terminal()) {
        for to in ALL {
            assert!(!from.can_transition_to(to), "{from} -> {to}");
        }
    }
}

#[test]
fn test_sellers_only_ship_and_deliver() {
    for from in ALL {
        for to in ALL {
            if from.seller_may_set(to) {
                assert!(from.can_transition_to(to), "seller move {from} -> {to} must be valid");
                assert!(matches!(to, OrderStatus::Shipped | OrderStatus::Delivered));
            }
        }
    }
    assert_eq!(seller_next(OrderStatus::Paid), vec![OrderStatus::Shipped]);
    assert_eq!(seller_next(OrderStatus::Shipped), vec![OrderStatus::Delivered]);
    assert!(seller_next(OrderStatus::Pending).is_empty());
}

#[test]
fn test_refunds_only_after_payment() {
    assert!(!OrderStatus::Pending.can_transition_to(OrderStatus::Refunded));
    assert!(OrderStatus::Paid.can_transition_to(OrderStatus::Refunded));
    assert!(OrderStatus::Shipped.can_transition_to(OrderStatus::Refunded));
    assert!(!OrderStatus::Delivered.can_transition_to(OrderStatus::Refunded));
}

#[test]
fn test_statuses_parse_from_form_values() {
    for status in ALL {
        let parsed: OrderStatus = status.as_str().parse().unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(parsed, status);
    }
    assert!("lost".parse::<OrderStatus>().is_err());
}
