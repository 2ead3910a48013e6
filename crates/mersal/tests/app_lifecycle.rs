//! End-to-end coverage of [`mersal::App`] over the in-memory backend:
//! worker-driven delivery, local dispatch, idempotency, saga correlation,
//! and retry-to-dead-letter.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

use mersal::{App, AppConfig};
use mersal_core::{Handler, LoadedSaga, MessageContext};
use mersal_types::{LogicalMessage, MessageHeaders, MESSAGE_ID};

#[derive(Debug, Serialize, Deserialize)]
struct Ping;

#[derive(Debug, Serialize, Deserialize)]
struct OrderPlaced {
    order_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct PaymentReceived {
    order_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct Boom;

struct CountingHandler {
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl Handler for CountingHandler {
    async fn handle(&mut self, _message: &LogicalMessage) -> anyhow::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(150)).await;
}

#[tokio::test]
async fn worker_delivers_a_sent_message_to_its_handler() {
    let calls = Arc::new(AtomicUsize::new(0));
    let config = AppConfig {
        own_address: "pings".to_string(),
        poll_interval_ms: 10,
        ..AppConfig::default()
    };

    let handler_calls = calls.clone();
    let app = App::builder(config)
        .handler::<Ping, _>("Ping", move |_ctx: &MessageContext<App>| {
            Box::new(CountingHandler { calls: handler_calls.clone() }) as Box<dyn Handler>
        })
        .build();

    app.start().await.unwrap();
    app.send(app.own_address().to_string(), LogicalMessage::new(MessageHeaders::new(), Ping))
        .await
        .unwrap();

    settle().await;
    app.stop().await;

    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn send_local_invokes_handlers_without_a_transport_round_trip() {
    let calls = Arc::new(AtomicUsize::new(0));
    let config = AppConfig::default();

    let handler_calls = calls.clone();
    let app = App::builder(config)
        .handler::<Ping, _>("Ping", move |_ctx: &MessageContext<App>| {
            Box::new(CountingHandler { calls: handler_calls.clone() }) as Box<dyn Handler>
        })
        .build();

    app.send_local(LogicalMessage::new(MessageHeaders::new(), Ping)).await.unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn duplicate_message_id_is_delivered_but_not_reinvoked() {
    let calls = Arc::new(AtomicUsize::new(0));
    let config = AppConfig {
        own_address: "pings".to_string(),
        poll_interval_ms: 10,
        ..AppConfig::default()
    };

    let handler_calls = calls.clone();
    let app = App::builder(config)
        .handler::<Ping, _>("Ping", move |_ctx: &MessageContext<App>| {
            Box::new(CountingHandler { calls: handler_calls.clone() }) as Box<dyn Handler>
        })
        .build();

    app.start().await.unwrap();

    let fixed_id = uuid::Uuid::new_v4();
    let mut headers = MessageHeaders::new();
    headers.insert(MESSAGE_ID, fixed_id);

    app.send(app.own_address().to_string(), LogicalMessage::new(headers.clone(), Ping))
        .await
        .unwrap();
    settle().await;

    app.send(app.own_address().to_string(), LogicalMessage::new(headers, Ping))
        .await
        .unwrap();
    settle().await;

    app.stop().await;

    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn saga_correlates_related_messages_and_deletes_itself_once_finished() {
    let order_calls = Arc::new(AtomicUsize::new(0));
    let payment_calls = Arc::new(AtomicUsize::new(0));

    let config = AppConfig {
        own_address: "orders".to_string(),
        poll_interval_ms: 10,
        ..AppConfig::default()
    };

    struct OrderHandler {
        calls: Arc<AtomicUsize>,
    }
    #[async_trait]
    impl Handler for OrderHandler {
        async fn handle(&mut self, _message: &LogicalMessage) -> anyhow::Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct PaymentHandler {
        calls: Arc<AtomicUsize>,
        transaction_context: Arc<mersal_core::TransactionContext>,
    }
    #[async_trait]
    impl Handler for PaymentHandler {
        async fn handle(&mut self, _message: &LogicalMessage) -> anyhow::Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(mut loaded) = self.transaction_context.take_item::<LoadedSaga>() {
                loaded.data.is_finished = true;
                self.transaction_context.insert_item(loaded);
            }
            Ok(())
        }
    }

    let order_handler_calls = order_calls.clone();
    let payment_handler_calls = payment_calls.clone();
    let app = App::builder(config)
        .handler::<OrderPlaced, _>("OrderPlaced", move |_ctx: &MessageContext<App>| {
            Box::new(OrderHandler { calls: order_handler_calls.clone() }) as Box<dyn Handler>
        })
        .handler::<PaymentReceived, _>("PaymentReceived", move |ctx: &MessageContext<App>| {
            Box::new(PaymentHandler {
                calls: payment_handler_calls.clone(),
                transaction_context: ctx.transaction_context.clone(),
            }) as Box<dyn Handler>
        })
        .saga::<OrderPlaced>("order", "order_id", |message| json!(message.body::<OrderPlaced>().unwrap().order_id), true)
        .saga::<PaymentReceived>("order", "order_id", |message| json!(message.body::<PaymentReceived>().unwrap().order_id), false)
        .build();

    app.start().await.unwrap();

    app.send(
        app.own_address().to_string(),
        LogicalMessage::new(
            MessageHeaders::new(),
            OrderPlaced {
                order_id: "order-1".to_string(),
            },
        ),
    )
    .await
    .unwrap();
    settle().await;

    app.send(
        app.own_address().to_string(),
        LogicalMessage::new(
            MessageHeaders::new(),
            PaymentReceived {
                order_id: "order-1".to_string(),
            },
        ),
    )
    .await
    .unwrap();
    settle().await;

    // The saga finished and was deleted on the first payment, so a second
    // payment for the same order correlates to nothing and is suppressed.
    app.send(
        app.own_address().to_string(),
        LogicalMessage::new(
            MessageHeaders::new(),
            PaymentReceived {
                order_id: "order-1".to_string(),
            },
        ),
    )
    .await
    .unwrap();
    settle().await;

    app.stop().await;

    assert_eq!(order_calls.load(Ordering::SeqCst), 1);
    assert_eq!(payment_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn a_message_that_exhausts_its_retry_budget_stops_being_redelivered() {
    struct FailingHandler {
        calls: Arc<AtomicUsize>,
    }
    #[async_trait]
    impl Handler for FailingHandler {
        async fn handle(&mut self, _message: &LogicalMessage) -> anyhow::Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(anyhow::anyhow!("always fails"))
        }
    }

    let calls = Arc::new(AtomicUsize::new(0));
    let config = AppConfig {
        own_address: "booms".to_string(),
        poll_interval_ms: 10,
        retry_max_attempts: 3,
        dead_letter_address: "dlq".to_string(),
        ..AppConfig::default()
    };

    let handler_calls = calls.clone();
    let app = App::builder(config)
        .handler::<Boom, _>("Boom", move |_ctx: &MessageContext<App>| {
            Box::new(FailingHandler { calls: handler_calls.clone() }) as Box<dyn Handler>
        })
        .build();

    app.start().await.unwrap();
    app.send(app.own_address().to_string(), LogicalMessage::new(MessageHeaders::new(), Boom))
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(400)).await;
    let after_first_settle = calls.load(Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(200)).await;
    let after_second_settle = calls.load(Ordering::SeqCst);

    app.stop().await;

    assert_eq!(after_first_settle, 3);
    assert_eq!(after_second_settle, 3);
}
