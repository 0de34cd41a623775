use super::*;
use crate::test_support::RecordingPoster;

#[derive(Default)]
struct RecordingNotifier {
    events: Mutex<Vec<OAuthCompleteEvent>>,
}

#[async_trait]
impl ClusterNotifier for RecordingNotifier {
    async fn send_oauth_complete(&self, event: &OAuthCompleteEvent) -> Result<(), ChatError> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}

fn user(id: &str) -> UserId {
    UserId::new(id).unwrap()
}

fn broker() -> (Arc<RecordingNotifier>, RecordingPoster, OAuthBroker) {
    let notifier = Arc::new(RecordingNotifier::default());
    let poster = RecordingPoster::new();
    let broker = OAuthBroker::new(notifier.clone(), Arc::new(poster.clone()), Duration::from_secs(45));
    (notifier, poster, broker)
}

mod oauth {
    use super::*;

    #[tokio::test]
    async fn test_successful_completion_wakes_waiter() {
        let (notifier, poster, broker) = broker();
        let subscription = broker.subscribe(&user("u1"));

        broker.publish(&user("u1"), Ok(()), false).await;

        assert_eq!(broker.wait_on(subscription).await, OAuthOutcome::Connected);
        assert!(poster.direct_messages().is_empty());
        assert_eq!(broker.waiter_count(&user("u1")), 0);
        assert_eq!(
            notifier.events.lock().unwrap().clone(),
            vec![OAuthCompleteEvent {
                user_id: user("u1"),
                error: None
            }]
        );
    }

    #[tokio::test]
    async fn test_failure_is_reported_by_direct_message() {
        let (_, poster, broker) = broker();
        let subscription = broker.subscribe(&user("u1"));

        broker
            .publish(&user("u1"), Err("bad_verification_code".to_string()), false)
            .await;

        assert_eq!(
            broker.wait_on(subscription).await,
            OAuthOutcome::Failed("bad_verification_code".to_string())
        );
        let dms = poster.direct_messages();
        assert_eq!(dms.len(), 1);
        assert_eq!(
            dms[0].1,
            "There was an error connecting to your GitHub: `bad_verification_code` Please double check your configuration."
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_notifies_user_and_unsubscribes() {
        let (_, poster, broker) = broker();

        let outcome = broker.wait_for_oauth_completion(&user("u1")).await;

        assert_eq!(outcome, OAuthOutcome::TimedOut);
        assert_eq!(broker.waiter_count(&user("u1")), 0);
        assert_eq!(
            poster.direct_messages()[0].1,
            "Timed out waiting for OAuth connection. Please check if the SiteURL is correct."
        );
    }

    #[tokio::test]
    async fn test_cluster_publish_is_not_relayed_again() {
        let (notifier, _, broker) = broker();
        let subscription = broker.subscribe(&user("u1"));

        broker.publish(&user("u1"), Ok(()), true).await;

        assert_eq!(broker.wait_on(subscription).await, OAuthOutcome::Connected);
        assert!(notifier.events.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_publish_only_reaches_that_user() {
        let (_, _, broker) = broker();
        let first = broker.subscribe(&user("u1"));
        let second = broker.subscribe(&user("u1"));
        let other = broker.subscribe(&user("u2"));

        broker.publish(&user("u1"), Ok(()), false).await;

        assert_eq!(broker.waiter_count(&user("u1")), 2);
        assert_eq!(broker.wait_on(first).await, OAuthOutcome::Connected);
        assert_eq!(broker.wait_on(second).await, OAuthOutcome::Connected);
        broker.unsubscribe(&other);
        assert_eq!(broker.waiter_count(&user("u2")), 0);
    }

    #[tokio::test]
    async fn test_close_wakes_waiters_and_ignores_publishes() {
        let (notifier, poster, broker) = broker();
        let subscription = broker.subscribe(&user("u1"));

        broker.close();
        broker.publish(&user("u1"), Ok(()), false).await;

        assert_eq!(broker.wait_on(subscription).await, OAuthOutcome::Closed);
        assert!(notifier.events.lock().unwrap().is_empty());
        assert!(poster.direct_messages().is_empty());
    }
}

mod ping {
    use super::*;

    #[tokio::test]
    async fn test_ping_reaches_every_subscriber() {
        let broker = PingBroker::new();
        let mut first = broker.subscribe();
        let mut second = broker.subscribe();

        let notice = PingNotice {
            repository: Some("acme/widgets".to_string()),
            hook_id: Some(7),
            zen: "Keep it logically awesome.".to_string(),
        };
        assert_eq!(broker.publish(notice.clone()), 2);

        assert_eq!(first.recv().await.unwrap(), notice);
        assert_eq!(second.recv().await.unwrap(), notice);
    }

    #[test]
    fn test_ping_without_subscribers_is_dropped() {
        let broker = PingBroker::default();

        assert_eq!(
            broker.publish(PingNotice {
                repository: None,
                hook_id: None,
                zen: String::new(),
            }),
            0
        );
    }
}
