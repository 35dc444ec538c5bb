// ═══════════════════════════════════════════════════════════════════
// Service Tests — SnapshotBuilder, HistoryService, PortfolioService
// ═══════════════════════════════════════════════════════════════════

use chrono::{DateTime, Duration, TimeZone, Utc};
use rust_decimal_macros::dec;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crypto_portfolio_core::errors::CoreError;
use crypto_portfolio_core::models::portfolio::{Holdings, Portfolio};
use crypto_portfolio_core::models::price::PricedCoin;
use crypto_portfolio_core::models::snapshot::{CoinSnapshot, PortfolioSnapshot};
use crypto_portfolio_core::models::time_range::TimeRange;
use crypto_portfolio_core::services::history_service::HistoryService;
use crypto_portfolio_core::services::portfolio_service::PortfolioService;
use crypto_portfolio_core::services::snapshot_builder::SnapshotBuilder;
use crypto_portfolio_core::storage::memory::InMemoryStore;
use crypto_portfolio_core::storage::traits::SnapshotStore;

fn holdings(entries: &[(&str, f64)]) -> Holdings {
    entries
        .iter()
        .map(|(symbol, amount)| (symbol.to_string(), *amount))
        .collect()
}

fn previous(entries: &[(&str, f64, f64)]) -> PortfolioSnapshot {
    let coins = entries
        .iter()
        .map(|(symbol, amount, price)| (symbol.to_string(), CoinSnapshot::new(*amount, *price)))
        .collect();
    PortfolioSnapshot::new("alice", Utc::now() - Duration::minutes(5), coins)
}

async fn no_previous() -> Result<Option<PortfolioSnapshot>, CoreError> {
    Ok(None)
}

fn assert_consistent(snapshot: &PortfolioSnapshot) {
    let mut sum = 0.0;
    for (symbol, coin) in snapshot.holdings() {
        assert!(
            (coin.value() - coin.amount() * coin.price_usd()).abs() < 1e-9,
            "{symbol} value mismatch"
        );
        sum += coin.value();
    }
    assert!((snapshot.total_value() - sum).abs() < 1e-9);
}

// ═══════════════════════════════════════════════════════════════════
// SnapshotBuilder
// ═══════════════════════════════════════════════════════════════════

mod snapshot_builder {
    use super::*;

    #[tokio::test]
    async fn all_symbols_priced() {
        let builder = SnapshotBuilder::new();
        let prices = vec![
            PricedCoin::new("BTC", dec!(100000)),
            PricedCoin::new("ETH", dec!(3000)),
        ];
        let snapshot = builder
            .build(
                "alice",
                &holdings(&[("BTC", 1.0), ("ETH", 5.0)]),
                &prices,
                no_previous,
            )
            .await
            .unwrap();

        assert_eq!(snapshot.user_id(), "alice");
        assert_eq!(snapshot.holdings().len(), 2);
        assert_eq!(snapshot.holding("BTC").unwrap().value(), 100_000.0);
        assert_eq!(snapshot.holding("ETH").unwrap().value(), 15_000.0);
        assert_eq!(snapshot.total_value(), 115_000.0);
        assert_consistent(&snapshot);
    }

    #[tokio::test]
    async fn missing_price_carries_forward_previous_unit_price() {
        let builder = SnapshotBuilder::new();
        let prior = previous(&[("BTC", 1.0, 99_000.0), ("ETH", 4.0, 2_800.0)]);
        let prices = vec![PricedCoin::new("BTC", dec!(100000))];

        let snapshot = builder
            .build(
                "alice",
                &holdings(&[("BTC", 1.0), ("ETH", 5.0)]),
                &prices,
                || async move { Ok::<_, CoreError>(Some(prior)) },
            )
            .await
            .unwrap();

        let eth = snapshot.holding("ETH").unwrap();
        assert_eq!(eth.amount(), 5.0);
        assert_eq!(eth.price_usd(), 2_800.0);
        assert_eq!(eth.value(), 14_000.0);
        assert_eq!(snapshot.holding("BTC").unwrap().price_usd(), 100_000.0);
        assert_eq!(snapshot.total_value(), 114_000.0);
        assert_consistent(&snapshot);
    }

    #[tokio::test]
    async fn symbol_without_any_price_is_omitted() {
        let builder = SnapshotBuilder::new();
        let snapshot = builder
            .build("alice", &holdings(&[("DOGE", 1000.0)]), &[], no_previous)
            .await
            .unwrap();

        assert!(snapshot.is_empty());
        assert_eq!(snapshot.total_value(), 0.0);
    }

    #[tokio::test]
    async fn symbol_missing_from_previous_is_omitted() {
        let builder = SnapshotBuilder::new();
        let prior = previous(&[("BTC", 1.0, 99_000.0)]);
        let snapshot = builder
            .build(
                "alice",
                &holdings(&[("BTC", 1.0), ("SOL", 10.0)]),
                &[],
                || async move { Ok::<_, CoreError>(Some(prior)) },
            )
            .await
            .unwrap();

        assert_eq!(snapshot.holdings().len(), 1);
        assert!(snapshot.holding("SOL").is_none());
        assert_eq!(snapshot.total_value(), 99_000.0);
    }

    #[tokio::test]
    async fn lookup_not_called_when_everything_is_priced() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let prices = vec![PricedCoin::new("BTC", dec!(1))];

        SnapshotBuilder::new()
            .build("alice", &holdings(&[("BTC", 1.0)]), &prices, move || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Ok::<_, CoreError>(None) }
            })
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn lookup_called_once_for_many_unpriced_symbols() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let prior = previous(&[("ETH", 1.0, 3_000.0), ("SOL", 1.0, 150.0), ("ADA", 1.0, 0.5)]);

        let snapshot = SnapshotBuilder::new()
            .build(
                "alice",
                &holdings(&[("ETH", 2.0), ("SOL", 3.0), ("ADA", 100.0)]),
                &[],
                move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                    async move { Ok::<_, CoreError>(Some(prior)) }
                },
            )
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(snapshot.total_value(), 6_000.0 + 450.0 + 50.0);
        assert_consistent(&snapshot);
    }

    #[tokio::test]
    async fn lookup_error_propagates() {
        let err = SnapshotBuilder::new()
            .build("alice", &holdings(&[("ETH", 2.0)]), &[], || async {
                Err::<Option<PortfolioSnapshot>, _>(CoreError::Store("unavailable".into()))
            })
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Store(_)));
    }

    #[test]
    fn zero_amount_is_included_with_zero_value() {
        let snapshot = SnapshotBuilder::new()
            .build_at(
                "alice",
                &holdings(&[("BTC", 0.0), ("ETH", 1.0)]),
                &[PricedCoin::new("BTC", dec!(100000)), PricedCoin::new("ETH", dec!(3000))],
                None,
                Utc::now(),
            )
            .unwrap();

        let btc = snapshot.holding("BTC").unwrap();
        assert_eq!(btc.value(), 0.0);
        assert_eq!(snapshot.total_value(), 3_000.0);
    }

    #[test]
    fn price_symbols_match_case_insensitively() {
        let mut lower = PricedCoin::new("eth", dec!(2500));
        lower.symbol = "eth".into();
        let snapshot = SnapshotBuilder::new()
            .build_at("alice", &holdings(&[("ETH", 2.0)]), &[lower], None, Utc::now())
            .unwrap();
        assert_eq!(snapshot.holding("ETH").unwrap().value(), 5_000.0);
    }

    #[test]
    fn null_price_counts_as_missing() {
        let mut coin = PricedCoin::new("ETH", dec!(2500));
        coin.current_price = None;
        let prior = previous(&[("ETH", 1.0, 2_000.0)]);

        let snapshot = SnapshotBuilder::new()
            .build_at(
                "alice",
                &holdings(&[("ETH", 3.0)]),
                &[coin],
                Some(&prior),
                Utc::now(),
            )
            .unwrap();
        assert_eq!(snapshot.holding("ETH").unwrap().price_usd(), 2_000.0);
        assert_eq!(snapshot.total_value(), 6_000.0);
    }

    #[test]
    fn first_price_for_a_symbol_wins() {
        let prices = vec![
            PricedCoin::new("BTC", dec!(100)),
            PricedCoin::new("BTC", dec!(200)),
        ];
        let snapshot = SnapshotBuilder::new()
            .build_at("alice", &holdings(&[("BTC", 1.0)]), &prices, None, Utc::now())
            .unwrap();
        assert_eq!(snapshot.total_value(), 100.0);
    }

    #[test]
    fn prices_for_unheld_coins_are_ignored() {
        let prices = vec![
            PricedCoin::new("BTC", dec!(100)),
            PricedCoin::new("XMR", dec!(150)),
        ];
        let snapshot = SnapshotBuilder::new()
            .build_at("alice", &holdings(&[("BTC", 1.0)]), &prices, None, Utc::now())
            .unwrap();
        assert_eq!(snapshot.holdings().len(), 1);
        assert!(snapshot.holding("XMR").is_none());
    }

    #[test]
    fn build_at_uses_given_timestamp() {
        let ts = Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap();
        let snapshot = SnapshotBuilder::new()
            .build_at("alice", &holdings(&[]), &[], None, ts)
            .unwrap();
        assert_eq!(snapshot.timestamp(), ts);
        assert!(snapshot.is_empty());
    }

    #[test]
    fn every_build_gets_a_fresh_id() {
        let builder = SnapshotBuilder::new();
        let h = holdings(&[("BTC", 1.0)]);
        let prices = vec![PricedCoin::new("BTC", dec!(1))];
        let a = builder.build_at("alice", &h, &prices, None, Utc::now()).unwrap();
        let b = builder.build_at("alice", &h, &prices, None, Utc::now()).unwrap();
        assert_ne!(a.id(), b.id());
    }
}

// ═══════════════════════════════════════════════════════════════════
// HistoryService
// ═══════════════════════════════════════════════════════════════════

mod history_service {
    use super::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 30, 12, 0, 0).unwrap()
    }

    fn snapshot_ago(user: &str, ago: Duration) -> PortfolioSnapshot {
        PortfolioSnapshot::new(
            user,
            now() - ago,
            HashMap::from([("BTC".to_string(), CoinSnapshot::new(1.0, 1.0))]),
        )
    }

    async fn seeded() -> HistoryService {
        let store = Arc::new(InMemoryStore::new());
        let ages = [
            Duration::minutes(10),
            Duration::minutes(50),
            Duration::hours(3),
            Duration::hours(30),
            Duration::days(10),
            Duration::days(60),
            Duration::days(120),
        ];
        for age in ages {
            SnapshotStore::save(store.as_ref(), &snapshot_ago("alice", age))
                .await
                .unwrap();
        }
        SnapshotStore::save(store.as_ref(), &snapshot_ago("bob", Duration::minutes(1)))
            .await
            .unwrap();
        HistoryService::new(store)
    }

    #[tokio::test]
    async fn each_range_counts() {
        let service = seeded().await;
        let expected = [
            (TimeRange::OneHour, 2),
            (TimeRange::TwentyFourHours, 3),
            (TimeRange::SevenDays, 4),
            (TimeRange::ThirtyDays, 5),
            (TimeRange::NinetyDays, 6),
        ];
        for (range, count) in expected {
            let found = service.get_snapshots_at("alice", range, now()).await.unwrap();
            assert_eq!(found.len(), count, "{range}");
            assert!(found.iter().all(|s| s.timestamp() >= range.cutoff(now())));
        }
    }

    #[tokio::test]
    async fn narrower_range_is_subset_of_wider() {
        let service = seeded().await;
        let hour = service
            .get_snapshots_at("alice", TimeRange::OneHour, now())
            .await
            .unwrap();
        let day = service
            .get_snapshots_at("alice", TimeRange::TwentyFourHours, now())
            .await
            .unwrap();
        assert!(hour.iter().all(|s| day.iter().any(|d| d.id() == s.id())));
    }

    #[tokio::test]
    async fn results_are_ascending() {
        let service = seeded().await;
        let found = service
            .get_snapshots_at("alice", TimeRange::NinetyDays, now())
            .await
            .unwrap();
        assert!(found.windows(2).all(|w| w[0].timestamp() <= w[1].timestamp()));
    }

    #[tokio::test]
    async fn only_requested_user() {
        let service = seeded().await;
        let found = service
            .get_snapshots_at("bob", TimeRange::NinetyDays, now())
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert!(found.iter().all(|s| s.user_id() == "bob"));
    }

    #[tokio::test]
    async fn unknown_token_behaves_like_24h() {
        let store = Arc::new(InMemoryStore::new());
        let recent = PortfolioSnapshot::new(
            "alice",
            Utc::now() - Duration::hours(2),
            HashMap::from([("BTC".to_string(), CoinSnapshot::new(1.0, 1.0))]),
        );
        let old = PortfolioSnapshot::new(
            "alice",
            Utc::now() - Duration::days(3),
            HashMap::from([("BTC".to_string(), CoinSnapshot::new(1.0, 1.0))]),
        );
        SnapshotStore::save(store.as_ref(), &recent).await.unwrap();
        SnapshotStore::save(store.as_ref(), &old).await.unwrap();
        let service = HistoryService::new(store);

        let unknown = service.get_snapshots("alice", "forever").await.unwrap();
        let day = service.get_snapshots("alice", "24h").await.unwrap();
        assert_eq!(unknown, day);
        assert_eq!(unknown.len(), 1);
        assert_eq!(unknown[0].id(), recent.id());
    }

    #[tokio::test]
    async fn no_history_is_empty_not_error() {
        let service = HistoryService::new(Arc::new(InMemoryStore::new()));
        assert!(service.get_snapshots("nobody", "7d").await.unwrap().is_empty());
        assert!(service.get_latest_snapshot("nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn latest_is_most_recent() {
        let service = seeded().await;
        let latest = service.get_latest_snapshot("alice").await.unwrap().unwrap();
        assert_eq!(latest.timestamp(), now() - Duration::minutes(10));
    }
}

// ═══════════════════════════════════════════════════════════════════
// PortfolioService
// ═══════════════════════════════════════════════════════════════════

mod portfolio_service {
    use super::*;

    #[test]
    fn add_creates_and_accumulates() {
        let service = PortfolioService::new();
        let mut p = Portfolio::new("alice");
        assert_eq!(service.add_holding(&mut p, "btc", 0.5).unwrap(), 0.5);
        assert_eq!(service.add_holding(&mut p, "BTC", 0.25).unwrap(), 0.75);
        assert_eq!(p.holdings.get("BTC"), Some(&0.75));
        assert!(!p.holdings.contains_key("btc"));
    }

    #[test]
    fn add_rejects_bad_amounts() {
        let service = PortfolioService::new();
        let mut p = Portfolio::new("alice");
        for amount in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let err = service.add_holding(&mut p, "BTC", amount).unwrap_err();
            assert!(matches!(err, CoreError::ValidationError(_)), "{amount}");
        }
        assert!(p.is_empty());
    }

    #[test]
    fn add_rejects_blank_symbol() {
        let service = PortfolioService::new();
        let mut p = Portfolio::new("alice");
        assert!(service.add_holding(&mut p, "   ", 1.0).is_err());
    }

    #[test]
    fn add_rejects_symbols_with_url_characters() {
        let service = PortfolioService::new();
        let mut p = Portfolio::new("alice");
        for symbol in ["btc&vs_currency=eur", "eth,sol", "a/b", "btc?x=1", "bt c"] {
            let err = service.add_holding(&mut p, symbol, 1.0).unwrap_err();
            assert!(matches!(err, CoreError::ValidationError(_)), "{symbol}");
        }
        assert!(p.is_empty());
        assert_eq!(service.add_holding(&mut p, "usd-coin", 1.0).unwrap(), 1.0);
        assert!(p.holdings.contains_key("USD-COIN"));
    }

    #[test]
    fn replace_rejects_malformed_symbol() {
        let service = PortfolioService::new();
        let mut p = Portfolio::with_holdings("alice", [("BTC", 1.0)]);
        let holdings = HashMap::from([("eth&ids=x".to_string(), 1.0)]);
        assert!(service.replace_holdings(&mut p, holdings).is_err());
        assert_eq!(p.holdings.get("BTC"), Some(&1.0));
    }

    #[test]
    fn remove_partial() {
        let service = PortfolioService::new();
        let mut p = Portfolio::with_holdings("alice", [("ETH", 5.0)]);
        assert_eq!(service.remove_holding(&mut p, "eth", 2.0).unwrap(), 3.0);
        assert_eq!(p.holdings.get("ETH"), Some(&3.0));
    }

    #[test]
    fn remove_everything_drops_symbol() {
        let service = PortfolioService::new();
        let mut p = Portfolio::with_holdings("alice", [("ETH", 5.0)]);
        assert_eq!(service.remove_holding(&mut p, "ETH", 5.0).unwrap(), 0.0);
        assert!(!p.holdings.contains_key("ETH"));
        assert!(p.is_empty());
    }

    #[test]
    fn remove_more_than_held_fails() {
        let service = PortfolioService::new();
        let mut p = Portfolio::with_holdings("alice", [("ETH", 1.0)]);
        let err = service.remove_holding(&mut p, "ETH", 2.0).unwrap_err();
        assert!(err.to_string().contains("Insufficient holdings"));
        assert_eq!(p.holdings.get("ETH"), Some(&1.0));
    }

    #[test]
    fn remove_unheld_symbol_fails() {
        let service = PortfolioService::new();
        let mut p = Portfolio::new("alice");
        assert!(service.remove_holding(&mut p, "SOL", 1.0).is_err());
    }

    #[test]
    fn replace_normalizes_and_validates() {
        let service = PortfolioService::default();
        let mut p = Portfolio::with_holdings("alice", [("BTC", 1.0)]);
        service
            .replace_holdings(&mut p, holdings(&[("eth", 2.0), ("sol", 0.0)]))
            .unwrap();
        assert_eq!(p.symbols(), vec!["ETH", "SOL"]);

        let err = service
            .replace_holdings(&mut p, holdings(&[("ADA", -1.0)]))
            .unwrap_err();
        assert!(matches!(err, CoreError::ValidationError(_)));
        assert_eq!(p.symbols(), vec!["ETH", "SOL"]);
    }

    #[test]
    fn replace_rejects_case_duplicates() {
        let service = PortfolioService::new();
        let mut p = Portfolio::new("alice");
        let err = service
            .replace_holdings(&mut p, holdings(&[("btc", 1.0), ("BTC", 2.0)]))
            .unwrap_err();
        assert!(err.to_string().contains("Duplicate holding"));
        assert!(p.is_empty());
    }
}
