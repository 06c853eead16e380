#[cfg(all(test, feature = "e2e-tests"))]
mod test {
    use std::time::Duration;

    use chrono::{Duration as ChronoDuration, Utc};
    use kube::api::{Api, PostParams};
    use kube::client::Client;
    use kube::runtime::wait::{await_condition, conditions, Condition};
    use kube::ResourceExt;
    use tokio::time::timeout;
    use yuptime_crd::monitor::TcpTarget;
    use yuptime_crd::{Monitor, MonitorSpec, ProbeKind, ProbeTarget, Schedule, Selector, Silence, SilenceSpec};

    fn has_condition<R: ConditionsHolder>(type_: &'static str, status: &'static str) -> impl Condition<R> {
        move |obj: Option<&R>| {
            obj.and_then(|o| o.conditions())
                .map(|cs| {
                    cs.iter()
                        .any(|c| c.type_ == type_ && format!("{:?}", c.status) == status)
                })
                .unwrap_or(false)
        }
    }

    trait ConditionsHolder {
        fn conditions(&self) -> Option<&Vec<yuptime_crd::Condition>>;
    }

    impl ConditionsHolder for Monitor {
        fn conditions(&self) -> Option<&Vec<yuptime_crd::Condition>> {
            self.status.as_ref().map(|s| &s.conditions)
        }
    }

    impl ConditionsHolder for Silence {
        fn conditions(&self) -> Option<&Vec<yuptime_crd::Condition>> {
            self.status.as_ref().map(|s| &s.conditions)
        }
    }

    async fn wait_for<R, C>(api: Api<R>, name: &str, condition: C)
    where
        R: kube::Resource
            + Clone
            + std::fmt::Debug
            + for<'de> k8s_openapi::serde::Deserialize<'de>
            + 'static
            + Send,
        C: Condition<R>,
    {
        timeout(Duration::from_secs(15), await_condition(api, name, condition))
            .await
            .unwrap()
            .unwrap();
    }

    fn tcp_monitor(name: &str, interval_sec: u32, timeout_sec: u32) -> Monitor {
        Monitor::new(
            name,
            MonitorSpec {
                type_: ProbeKind::Tcp,
                target: ProbeTarget::Tcp(TcpTarget {
                    host: "db.default.svc".into(),
                    port: 5432,
                }),
                schedule: Schedule {
                    interval_sec,
                    timeout_sec,
                    retries: 0,
                    initial_delay_sec: 0,
                    jitter_percent: 10,
                },
                success_criteria: None,
                labels: None,
                tags: None,
                enabled: None,
                alertmanager_url: None,
            },
        )
    }

    #[tokio::test]
    async fn monitor_becomes_ready() {
        let name = "e2e-monitor-ready";
        let client = Client::try_default().await.unwrap();
        let monitor_api = Api::<Monitor>::namespaced(client.clone(), "default");

        monitor_api
            .create(&PostParams::default(), &tcp_monitor(name, 60, 10))
            .await
            .unwrap();

        wait_for(monitor_api.clone(), name, has_condition("Ready", "True")).await;

        monitor_api.delete(name, &Default::default()).await.unwrap();
    }

    #[tokio::test]
    async fn monitor_with_bad_schedule_stays_invalid() {
        let name = "e2e-monitor-invalid";
        let client = Client::try_default().await.unwrap();
        let monitor_api = Api::<Monitor>::namespaced(client.clone(), "default");

        // timeoutSec == intervalSec violates the schedule invariant.
        monitor_api
            .create(&PostParams::default(), &tcp_monitor(name, 30, 30))
            .await
            .unwrap();

        wait_for(monitor_api.clone(), name, has_condition("Valid", "False")).await;

        monitor_api.delete(name, &Default::default()).await.unwrap();
    }

    #[tokio::test]
    async fn monitor_delete_is_observed() {
        let name = "e2e-monitor-delete";
        let client = Client::try_default().await.unwrap();
        let monitor_api = Api::<Monitor>::namespaced(client.clone(), "default");

        monitor_api
            .create(&PostParams::default(), &tcp_monitor(name, 60, 10))
            .await
            .unwrap();
        wait_for(monitor_api.clone(), name, has_condition("Ready", "True")).await;

        let monitor = monitor_api.get(name).await.unwrap();
        monitor_api.delete(name, &Default::default()).await.unwrap();

        wait_for(
            monitor_api.clone(),
            name,
            conditions::is_deleted(&monitor.uid().unwrap()),
        )
        .await;
    }

    #[tokio::test]
    async fn silence_becomes_ready() {
        let name = "e2e-silence-ready";
        let client = Client::try_default().await.unwrap();
        let silence_api = Api::<Silence>::namespaced(client.clone(), "default");

        let silence = Silence::new(
            name,
            SilenceSpec {
                expires_at: Utc::now() + ChronoDuration::hours(1),
                match_: Selector {
                    match_names: Some(vec!["e2e-monitor-ready".to_string()]),
                    ..Default::default()
                },
                reason: Some("planned maintenance".into()),
            },
        );

        silence_api.create(&PostParams::default(), &silence).await.unwrap();
        wait_for(silence_api.clone(), name, has_condition("Ready", "True")).await;

        silence_api.delete(name, &Default::default()).await.unwrap();
    }
}
