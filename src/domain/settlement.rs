//! Settlement math: per-vendor charge groups and vendor earnings.
//!
//! Everything here is pure. The settlement service feeds it orders and payouts read
//! from the store and acts on the result.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use crate::domain::aggregates::order::{Order, OrderStatus};
use crate::domain::aggregates::payout::{Payout, PayoutPeriod, PayoutStatus};
use crate::domain::value_objects::Money;

/// The slice of a charge owed to one vendor.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChargeGroup {
    pub vendor_id: String,
    pub external_account_id: Option<String>,
    pub subtotal: Money,
    pub line_count: usize,
}

/// Splits `(vendor_id, line_total)` pairs into disjoint per-vendor groups, in the
/// order each vendor first appears.
pub fn partition_by_vendor<'a, I>(lines: I) -> Vec<ChargeGroup>
where
    I: IntoIterator<Item = (&'a str, Money)>,
{
    let mut groups: Vec<ChargeGroup> = Vec::new();
    for (vendor_id, total) in lines {
        match groups.iter_mut().find(|g| g.vendor_id == vendor_id) {
            Some(group) => {
                group.subtotal += total;
                group.line_count += 1;
            }
            None => groups.push(ChargeGroup { vendor_id: vendor_id.to_string(), external_account_id: None, subtotal: total, line_count: 1 }),
        }
    }
    groups
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VendorEarnings {
    pub vendor_id: String,
    pub total_earnings: Money,
    pub available_for_payout: Money,
    pub pending_earnings: Money,
    pub last_payout_date: Option<DateTime<Utc>>,
    pub last_payout_amount: Option<Money>,
}

/// Earnings for `vendor_id` given every order and every payout of that vendor.
///
/// Delivered lines are earned, in-flight lines are pending, cancelled lines count for
/// nothing. Processed and pending payouts both draw down the available balance; a failed
/// payout releases its hold.
pub fn vendor_earnings(vendor_id: &str, orders: &[Order], payouts: &[Payout]) -> VendorEarnings {
    let mut earned = Money::ZERO;
    let mut pending = Money::ZERO;
    for order in orders {
        let share = order.vendor_total(vendor_id);
        match order.status() {
            OrderStatus::Delivered => earned += share,
            OrderStatus::Cancelled => {}
            OrderStatus::Pending | OrderStatus::Processing | OrderStatus::Shipped => pending += share,
        }
    }

    let own: Vec<&Payout> = payouts.iter().filter(|p| p.vendor_id() == vendor_id).collect();
    let held: Money = own.iter().filter(|p| p.holds_balance()).map(|p| p.amount()).sum();
    let last = own
        .iter()
        .filter(|p| p.status() == PayoutStatus::Processed)
        .max_by_key(|p| p.updated_at());

    VendorEarnings {
        vendor_id: vendor_id.to_string(),
        total_earnings: earned + pending,
        available_for_payout: (earned - held).clamp_zero(),
        pending_earnings: pending,
        last_payout_date: last.map(|p| p.updated_at()),
        last_payout_amount: last.map(|p| p.amount()),
    }
}

/// Periods for one vendor must be disjoint and move forward: a new period may not start
/// before the end of the latest period on a payout that still holds balance.
pub fn period_conflicts(period: &PayoutPeriod, existing: &[Payout]) -> bool {
    existing
        .iter()
        .filter(|p| p.holds_balance())
        .filter_map(Payout::period)
        .any(|other| period.start < other.end)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::cart::{approved, Cart, CartTotals};
    use crate::domain::aggregates::order::address;
    use chrono::Duration;
    use proptest::prelude::*;

    fn order_for(vendor: &str, cents: i64, qty: i64, status: OrderStatus) -> Order {
        let product = approved("Part", cents, vendor);
        let mut cart = Cart::for_buyer("c1");
        cart.add_product(&product).unwrap();
        cart.update_quantity(product.id(), qty).unwrap();
        let mut order = Order::place(&cart, "Ada", CartTotals::default(), address(), "card", cart.checkout_token()).unwrap();
        let path: &[OrderStatus] = match status {
            OrderStatus::Pending => &[],
            OrderStatus::Processing => &[OrderStatus::Processing],
            OrderStatus::Shipped => &[OrderStatus::Processing, OrderStatus::Shipped],
            OrderStatus::Delivered => &[OrderStatus::Processing, OrderStatus::Shipped, OrderStatus::Delivered],
            OrderStatus::Cancelled => &[OrderStatus::Cancelled],
        };
        for s in path { order.transition(*s).unwrap(); }
        order
    }

    fn processed(vendor: &str, cents: i64) -> Payout {
        let mut p = Payout::request(vendor, format!("{vendor} shop"), Money::from_cents(cents), None, None).unwrap();
        p.settle(PayoutStatus::Processed, None).unwrap();
        p
    }

    #[test]
    fn test_partition_by_vendor() {
        let groups = partition_by_vendor([("v1", Money::from_cents(100)), ("v2", Money::from_cents(250)), ("v1", Money::from_cents(50))]);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].vendor_id, "v1");
        assert_eq!(groups[0].subtotal, Money::from_cents(150));
        assert_eq!(groups[0].line_count, 2);
        assert_eq!(groups[1].subtotal, Money::from_cents(250));
    }

    #[test]
    fn test_earnings_scenario() {
        let orders = vec![
            order_for("v1", 174999, 3, OrderStatus::Delivered),
            order_for("v1", 28999, 1, OrderStatus::Shipped),
            order_for("v1", 9999, 1, OrderStatus::Cancelled),
            order_for("v2", 89999, 1, OrderStatus::Delivered),
        ];
        let payouts = vec![processed("v1", 140848), processed("v1", 89255), processed("v2", 100)];
        let e = vendor_earnings("v1", &orders, &payouts);
        assert_eq!(e.available_for_payout, Money::from_cents(294894));
        assert_eq!(e.pending_earnings, Money::from_cents(28999));
        assert_eq!(e.total_earnings, Money::from_cents(524997 + 28999));
        assert!(e.last_payout_amount.is_some());
    }

    #[test]
    fn test_pending_payout_holds_and_failed_releases() {
        let orders = vec![order_for("v1", 10000, 1, OrderStatus::Delivered)];
        let mut held = Payout::request("v1", "v1 shop", Money::from_cents(4000), None, None).unwrap();
        let e = vendor_earnings("v1", &orders, std::slice::from_ref(&held));
        assert_eq!(e.available_for_payout, Money::from_cents(6000));
        held.settle(PayoutStatus::Failed, Some("bank rejected".into())).unwrap();
        let e = vendor_earnings("v1", &orders, &[held]);
        assert_eq!(e.available_for_payout, Money::from_cents(10000));
        assert_eq!(e.last_payout_amount, None);
    }

    #[test]
    fn test_period_conflicts() {
        let t0 = Utc::now();
        let first = PayoutPeriod::new(t0, t0 + Duration::days(7)).unwrap();
        let existing = vec![Payout::request("v1", "v1 shop", Money::from_cents(1), Some(first), None).unwrap()];
        let overlapping = PayoutPeriod::new(t0 + Duration::days(3), t0 + Duration::days(10)).unwrap();
        let earlier = PayoutPeriod::new(t0 - Duration::days(7), t0).unwrap();
        let next = PayoutPeriod::new(t0 + Duration::days(7), t0 + Duration::days(14)).unwrap();
        assert!(period_conflicts(&overlapping, &existing));
        assert!(period_conflicts(&earlier, &existing));
        assert!(!period_conflicts(&next, &existing));
    }

    #[derive(Clone, Debug)]
    enum Step { Deliver(i64), Payout(i64) }

    fn step() -> impl Strategy<Value = Step> {
        prop_oneof![(1i64..50_000).prop_map(Step::Deliver), (1i64..80_000).prop_map(Step::Payout)]
    }

    proptest! {
        #[test]
        fn prop_available_never_negative(steps in proptest::collection::vec(step(), 1..40)) {
            let mut orders = Vec::new();
            let mut payouts: Vec<Payout> = Vec::new();
            for s in steps {
                match s {
                    Step::Deliver(cents) => orders.push(order_for("v1", cents, 1, OrderStatus::Delivered)),
                    Step::Payout(cents) => {
                        let amount = Money::from_cents(cents);
                        let available = vendor_earnings("v1", &orders, &payouts).available_for_payout;
                        if amount <= available {
                            let mut p = Payout::request("v1", "v1 shop", amount, None, None).unwrap();
                            p.settle(PayoutStatus::Processed, None).unwrap();
                            payouts.push(p);
                        }
                    }
                }
                let e = vendor_earnings("v1", &orders, &payouts);
                prop_assert!(!e.available_for_payout.is_negative());
                let delivered: Money = orders.iter().map(|o| o.total()).sum();
                let paid: Money = payouts.iter().map(|p| p.amount()).sum();
                prop_assert_eq!(e.available_for_payout, delivered - paid);
            }
        }
    }
}
