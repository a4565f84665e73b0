use gridbot::application::backtest::PositionTracker;
use gridbot::domain::market::{Candle, Price};
use gridbot::domain::strategy::{
    AdvisorConfig, GridAdvisor, OpenAdviceStrategy, TrendConfig,
};
use gridbot::domain::trading::PositionSummary;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

fn advisor_config() -> AdvisorConfig {
    AdvisorConfig {
        inst_id: "ETH-USDT".to_string(),
        position_size: dec!(100),
        fee_rate: dec!(0.001),
        take_profit_rate_min: dec!(0.0015),
        take_profit_rate_max: dec!(0.003),
        break_even_min: dec!(1),
        break_even_max: dec!(20),
        trend: TrendConfig::default(),
        enable_trend_filter: true,
        enable_red_candle_filter: true,
    }
}

fn candle(open: Decimal, close: Decimal, ts: i64) -> Candle {
    Candle::from_values(open, open.max(close), open.min(close), close, ts).unwrap()
}

#[test]
fn test_open_and_close_price_strings() {
    let advisor = GridAdvisor::new(advisor_config()).unwrap();
    let current = candle(dec!(3890), dec!(3894.94), 0);
    let advice = advisor.get_open_advice(
        Price::new(dec!(3894.94)).unwrap(),
        &current,
        &current,
        &[],
        &PositionSummary::default(),
    );

    assert!(advice.should_open);
    // trunc2(3894.94 * 0.999) and ceil2(open * 1.0015), as exact strings.
    assert_eq!(advice.open_price, "3891.04");
    assert_eq!(advice.close_price, "3896.88");
    assert_eq!(advice.current_price, "3894.94");
}

#[test]
fn test_bearish_collapse_blocks_open() {
    let advisor = GridAdvisor::new(advisor_config()).unwrap();

    // Fifty quiet candles, then five bearish ones dropping ~0.3% each:
    // more than 0.8% cumulative over the last ten.
    let mut history = Vec::new();
    for i in 0..50 {
        history.push(candle(dec!(2500), dec!(2500), i * 300_000));
    }
    let mut price = dec!(2500);
    for i in 50..55 {
        let next = (price * dec!(0.997)).round_dp(2);
        history.push(candle(price, next, i * 300_000));
        price = next;
    }

    let current = *history.last().unwrap();
    let advice = advisor.get_open_advice(
        Price::new(price).unwrap(),
        &current,
        &current,
        &history,
        &PositionSummary::default(),
    );

    assert!(!advice.should_open);
    assert!(
        advice.reason.starts_with("trend_filter_blocked"),
        "reason: {}",
        advice.reason
    );
}

#[test]
fn test_break_even_exit_from_tracker_state() {
    let advisor = GridAdvisor::new(advisor_config()).unwrap();

    // Book the two opens through the tracker so the summary carries the
    // running average, exactly as the backtest engine builds it.
    let mut tracker = PositionTracker::new();
    tracker.add_position(dec!(2500), dec!(100), 0, dec!(2520));
    tracker.add_position(dec!(2520), dec!(100), 1, dec!(2540));

    let summary = PositionSummary {
        count: tracker.open_positions().len(),
        total_size: tracker.total_size(),
        avg_price: tracker.average_cost(),
        fees_paid: dec!(0.1),
        realized_pnl: Decimal::ZERO,
    };

    // Mark high enough that the projection lands inside [1, 20]:
    // coins ~0.0797, so +1% on the average adds ~2 quote units.
    let mark = dec!(2535);
    let (should_exit, expected) =
        summary.should_break_even(mark, dec!(0.001), dec!(1), dec!(20));
    assert!(should_exit, "expected_profit {expected} outside window");

    let current = candle(dec!(2530), dec!(2535), 2);
    let advice = advisor.get_open_advice(
        Price::new(mark).unwrap(),
        &current,
        &current,
        &[],
        &summary,
    );
    assert!(!advice.should_open);
    assert!(
        advice.reason.starts_with("break_even_exit: expected_profit="),
        "reason: {}",
        advice.reason
    );
    assert!(advice.reason.contains("(target: 1-20)"));
}

#[test]
fn test_break_even_math_matches_tracker_unrealized() {
    // The summary's projection must agree with the tracker's unrealized
    // formulation on a freshly opened book (no closes yet).
    let mut tracker = PositionTracker::new();
    tracker.add_position(dec!(2500), dec!(100), 0, dec!(2520));
    tracker.add_position(dec!(2520), dec!(100), 1, dec!(2540));

    let summary = PositionSummary {
        count: 2,
        total_size: tracker.total_size(),
        avg_price: tracker.average_cost(),
        fees_paid: Decimal::ZERO,
        realized_pnl: Decimal::ZERO,
    };

    let mark = dec!(2510);
    let fee = dec!(0.001);
    let (_, expected) = summary.should_break_even(mark, fee, dec!(1), dec!(20));
    let unrealized = tracker.unrealized_pnl(mark, fee);
    assert!(
        (expected - unrealized).abs() < dec!(0.000000000000000001),
        "summary {expected} vs tracker {unrealized}"
    );
}

#[test]
fn test_identical_inputs_identical_advice() {
    let advisor = GridAdvisor::new(advisor_config()).unwrap();
    let history: Vec<Candle> = (0..60)
        .map(|i| candle(dec!(2500), dec!(2501), i * 300_000))
        .collect();
    let current = candle(dec!(2500.5), dec!(2501.2), 61 * 300_000);
    let summary = PositionSummary {
        count: 1,
        total_size: dec!(100),
        avg_price: dec!(2502),
        fees_paid: dec!(0.1),
        realized_pnl: dec!(0.05),
    };
    let price = Price::new(dec!(2501.2)).unwrap();

    let first = advisor.get_open_advice(price, &current, &current, &history, &summary);
    for _ in 0..10 {
        let again = advisor.get_open_advice(price, &current, &current, &history, &summary);
        assert_eq!(again, first);
        assert_eq!(
            serde_json::to_vec(&again).unwrap(),
            serde_json::to_vec(&first).unwrap()
        );
    }
}
