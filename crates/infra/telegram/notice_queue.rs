use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::{
    domain::{
        repositories::notifications::NoticePublisher,
        value_objects::{
            enums::plan_kinds::PlanKind,
            notices::{NoticeKind, UserNotice},
        },
    },
    infra::telegram::bot_client::ChatMessenger,
};

pub const DEFAULT_NOTICE_QUEUE_CAPACITY: usize = 256;

/// Queues user notices and delivers them from a background task, so a slow
/// or failing Telegram API never holds up webhook acknowledgement.
#[derive(Clone)]
pub struct NoticeQueue {
    tx: mpsc::Sender<UserNotice>,
}

impl NoticeQueue {
    /// Must be called from within a Tokio runtime.
    pub fn start(messenger: Arc<dyn ChatMessenger>, capacity: usize) -> Self {
        let (tx, mut rx) = mpsc::channel::<UserNotice>(capacity.max(1));

        tokio::spawn(async move {
            while let Some(notice) = rx.recv().await {
                let telegram_id = notice.telegram_id;
                let kind = notice.kind.label();

                match messenger.send_text(telegram_id, render_notice(&notice)).await {
                    Ok(()) => debug!(%telegram_id, kind, "notices: delivered"),
                    Err(error) => warn!(
                        %telegram_id,
                        kind,
                        error = %error,
                        "notices: delivery failed, notice dropped"
                    ),
                }
            }
        });

        Self { tx }
    }
}

impl NoticePublisher for NoticeQueue {
    fn publish(&self, notice: UserNotice) {
        let telegram_id = notice.telegram_id;
        match self.tx.try_send(notice) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(%telegram_id, "notices: queue full; dropping notice");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                warn!(%telegram_id, "notices: queue closed; dropping notice");
            }
        }
    }
}

fn plan_title(plan_kind: PlanKind) -> &'static str {
    match plan_kind {
        PlanKind::Trial => "Пробный",
        PlanKind::Basic => "Базовый",
        PlanKind::Premium => "Премиум",
        PlanKind::Corporate => "Корпоративный",
    }
}

pub fn render_notice(notice: &UserNotice) -> String {
    match &notice.kind {
        NoticeKind::SubscriptionActivated {
            plan_kind,
            expires_at,
        } => format!(
            "🎉 Оплата прошла успешно!\n\n✅ Тариф: {}\n📅 Подписка действует до: {} (UTC)",
            plan_title(*plan_kind),
            expires_at.format("%d.%m.%Y %H:%M")
        ),
        NoticeKind::PaymentCancelled { plan_kind } => format!(
            "Платёж за тариф «{}» отменён. Подписка не оформлена.",
            plan_title(*plan_kind)
        ),
        NoticeKind::PaymentFailed { plan_kind } => format!(
            "❌ Не удалось провести оплату тарифа «{}». Проверьте данные карты и попробуйте ещё раз.",
            plan_title(*plan_kind)
        ),
        NoticeKind::SubscriptionRefunded { plan_kind } => format!(
            "Возврат по тарифу «{}» выполнен. Подписка отменена.",
            plan_title(*plan_kind)
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::telegram::bot_client::MockChatMessenger;
    use chrono::{TimeZone, Utc};
    use mockall::predicate::eq;
    use std::time::Duration;

    #[test]
    fn activation_notice_mentions_plan_and_expiry() {
        let notice = UserNotice {
            telegram_id: 1,
            kind: NoticeKind::SubscriptionActivated {
                plan_kind: PlanKind::Basic,
                expires_at: Utc.with_ymd_and_hms(2025, 7, 1, 12, 30, 0).unwrap(),
            },
        };

        let text = render_notice(&notice);
        assert!(text.contains("Базовый"));
        assert!(text.contains("01.07.2025 12:30"));
    }

    #[tokio::test]
    async fn published_notice_reaches_messenger() {
        let (delivered_tx, mut delivered_rx) = mpsc::unbounded_channel::<String>();

        let mut messenger = MockChatMessenger::new();
        messenger
            .expect_send_text()
            .with(eq(42_i64), mockall::predicate::always())
            .times(1)
            .returning(move |_, text| {
                let delivered_tx = delivered_tx.clone();
                Box::pin(async move {
                    let _ = delivered_tx.send(text);
                    Ok(())
                })
            });

        let queue = NoticeQueue::start(Arc::new(messenger), 4);
        queue.publish(UserNotice {
            telegram_id: 42,
            kind: NoticeKind::PaymentFailed {
                plan_kind: PlanKind::Premium,
            },
        });

        let text = tokio::time::timeout(Duration::from_secs(1), delivered_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(text.contains("Премиум"));
    }

    #[tokio::test]
    async fn delivery_failure_does_not_stop_the_worker() {
        let (delivered_tx, mut delivered_rx) = mpsc::unbounded_channel::<i64>();

        let mut messenger = MockChatMessenger::new();
        messenger
            .expect_send_text()
            .times(2)
            .returning(move |chat_id, _| {
                let delivered_tx = delivered_tx.clone();
                Box::pin(async move {
                    let _ = delivered_tx.send(chat_id);
                    if chat_id == 1 {
                        Err(anyhow::anyhow!("bot was blocked by the user"))
                    } else {
                        Ok(())
                    }
                })
            });

        let queue = NoticeQueue::start(Arc::new(messenger), 4);
        for telegram_id in [1, 2] {
            queue.publish(UserNotice {
                telegram_id,
                kind: NoticeKind::PaymentCancelled {
                    plan_kind: PlanKind::Basic,
                },
            });
        }

        for expected in [1, 2] {
            let chat_id = tokio::time::timeout(Duration::from_secs(1), delivered_rx.recv())
                .await
                .unwrap()
                .unwrap();
            assert_eq!(chat_id, expected);
        }
    }
}
