use crate::config::Config;
use crate::datasources::WeatherProvider;
use crate::error::Result;
use crate::logic::calculations::accumulate_deficit;
use crate::logic::rules::DecisionEngine;
use crate::logic::suppression::Suppression;
use crate::models::{IrrigationRecommendation, SimpleMessage};
use crate::state::StateStore;
use chrono::{Local, NaiveDate, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Result of one advisor cycle
#[derive(Debug, Clone, Serialize)]
pub struct CycleOutcome {
    /// Present when every input was fetched and a decision was made
    pub recommendation: Option<IrrigationRecommendation>,
    /// What gets published: the decision, the suppression notice or the fallback
    pub message: SimpleMessage,
    pub suppression: Option<Suppression>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CycleOutcome {
    fn decided(recommendation: IrrigationRecommendation) -> Self {
        Self {
            message: SimpleMessage::from(&recommendation),
            recommendation: Some(recommendation),
            suppression: None,
            error: None,
        }
    }

    fn failed(error: String) -> Self {
        Self {
            recommendation: None,
            message: SimpleMessage::data_fetch_failed(),
            suppression: None,
            error: Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Water applied recently, reported only when it suppressed watering
    pub fn recent_irrigation_mm(&self) -> f64 {
        self.suppression
            .filter(|s| s.suppress)
            .map(|s| s.recent_total_mm)
            .unwrap_or(0.0)
    }
}

/// Runs the fetch, decide, suppress and log cycle
pub struct AdvisorService<P: WeatherProvider> {
    provider: P,
    engine: DecisionEngine,
    store: Arc<dyn StateStore>,
    history_days: u32,
    suppression_window_hours: i64,
    cycle_lock: Mutex<()>,
}

impl<P: WeatherProvider> AdvisorService<P> {
    pub fn new(provider: P, store: Arc<dyn StateStore>, config: &Config) -> Self {
        Self {
            provider,
            engine: DecisionEngine::new(),
            store,
            history_days: config.openweathermap.history_days,
            suppression_window_hours: config.advisor.suppression_window_hours,
            cycle_lock: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &Arc<dyn StateStore> {
        &self.store
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Fetch and decide, without touching the state store
    pub async fn run_cycle(&self) -> CycleOutcome {
        self.run_cycle_on(Local::now().date_naive()).await
    }

    pub async fn run_cycle_on(&self, today: NaiveDate) -> CycleOutcome {
        let _guard = self.cycle_lock.lock().await;
        self.cycle(today).await
    }

    /// Full cycle: decide, suppress after recent irrigation, log when watering
    pub async fn advise(&self) -> CycleOutcome {
        self.advise_on(Local::now().date_naive()).await
    }

    pub async fn advise_on(&self, today: NaiveDate) -> CycleOutcome {
        let _guard = self.cycle_lock.lock().await;
        let mut outcome = self.cycle(today).await;
        if !outcome.is_success() {
            return outcome;
        }

        match self.store.suppression(self.suppression_window_hours, Utc::now()) {
            Ok(suppression) => {
                if suppression.suppress && outcome.message.watering_required {
                    tracing::info!(
                        recent_mm = suppression.recent_total_mm,
                        window_hours = self.suppression_window_hours,
                        "Recently irrigated, suppressing watering"
                    );
                    outcome.message = SimpleMessage::recently_irrigated(suppression.recent_total_mm);
                }
                outcome.suppression = Some(suppression);
            }
            Err(e) => tracing::warn!(error = %e, "Could not check recent irrigation"),
        }

        if outcome.message.watering_required {
            if let Err(e) = self
                .store
                .log_recommendation(outcome.message.water_amount_lpm2, &outcome.message.reason)
            {
                tracing::warn!(error = %e, "Failed to log recommendation");
            }
        }

        outcome
    }

    async fn cycle(&self, today: NaiveDate) -> CycleOutcome {
        match self.decide(today).await {
            Ok(recommendation) => {
                tracing::info!(
                    action = %recommendation.action,
                    amount_mm = recommendation.amount_mm,
                    confidence = recommendation.confidence_percent,
                    deficit_mm = recommendation.deficit_mm(),
                    "Irrigation recommendation"
                );
                CycleOutcome::decided(recommendation)
            }
            Err(e) => {
                tracing::error!(error = %e, "Advisor cycle failed");
                CycleOutcome::failed(e.to_string())
            }
        }
    }

    async fn decide(&self, today: NaiveDate) -> Result<IrrigationRecommendation> {
        let history = self.provider.fetch_history(self.history_days).await?;
        let current = self.provider.fetch_current().await?;
        let forecast = self.provider.fetch_forecast().await?;

        let deficit = accumulate_deficit(&history);
        tracing::debug!(
            days = history.len(),
            deficit_mm = deficit,
            forecast_days = forecast.len(),
            "Weather data collected"
        );

        self.engine.recommend(deficit, &current, &forecast, today)
    }
}
