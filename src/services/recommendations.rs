use std::sync::Arc;
use std::time::Instant;

use crate::{
    cache::{CacheKey, ResponseCache},
    cached,
    error::{AppError, AppResult},
    model::BatchExecutor,
    models::{
        Corpus, PopularityDistribution, ProfileHoldout, Recommendation, RecommendRequest,
        RecommendResponse,
    },
    services::{
        contributions::attach_contributors,
        encoder::{DroppedRatingPolicy, NormalizedProfile, ProfileEncoder},
        holdout::{self, HoldoutVariants, IMPACT_BASELINE_SIZE},
        niche_boost::apply_niche_boost,
        scoring::{select_top_k, ScoringMethod, DEFAULT_LOGIT_WEIGHT},
        worker::InferenceWorker,
    },
};

/// Upper bound on the candidate pool fetched before niche boosting
const MAX_CANDIDATE_POOL: usize = 500;

/// Candidates fetched before niche boosting re-orders and truncates them
pub(crate) fn candidate_pool_size(top_k: usize) -> usize {
    top_k.saturating_mul(3).min(MAX_CANDIDATE_POOL).max(top_k)
}

/// Everything the engine needs to serve one request
#[derive(Debug, Clone)]
pub struct InferenceJob {
    pub profile: NormalizedProfile,
    pub top_k: usize,
    pub logit_weight: f32,
    pub method: ScoringMethod,
    pub include_profile_holdout: bool,
    pub include_contribution_analysis: bool,
    pub top_contributors: usize,
    pub niche_boost_factor: f32,
}

impl InferenceJob {
    pub fn new(profile: NormalizedProfile, request: &RecommendRequest) -> Self {
        Self {
            profile,
            top_k: request.top_k,
            logit_weight: request.logit_weight.unwrap_or(DEFAULT_LOGIT_WEIGHT),
            method: ScoringMethod::from_alt_ranking(request.use_alt_ranking),
            include_profile_holdout: request.include_profile_holdout,
            include_contribution_analysis: request.include_contribution_analysis,
            top_contributors: request.top_contributors,
            niche_boost_factor: request.niche_boost_factor,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct InferenceOutput {
    pub recommendations: Vec<Recommendation>,
    pub profile_holdout: Option<ProfileHoldout>,
}

/// The compute side of a recommendation request
///
/// Runs on the inference worker thread. A job either produces a complete output or
/// fails as a whole.
pub struct RecommendationEngine {
    executor: BatchExecutor,
    corpus: Arc<Corpus>,
    popularity: Option<Arc<PopularityDistribution>>,
}

impl RecommendationEngine {
    pub fn new(
        executor: BatchExecutor,
        corpus: Arc<Corpus>,
        popularity: Option<Arc<PopularityDistribution>>,
    ) -> AppResult<Self> {
        if executor.corpus_size() != corpus.len() {
            return Err(AppError::Config(format!(
                "model scores {} items but the corpus has {}",
                executor.corpus_size(),
                corpus.len()
            )));
        }

        Ok(Self {
            executor,
            corpus,
            popularity,
        })
    }

    pub fn corpus(&self) -> &Arc<Corpus> {
        &self.corpus
    }

    pub fn run(&self, job: InferenceJob) -> AppResult<InferenceOutput> {
        let started = Instant::now();
        let profile = &job.profile;
        let strategy = job.method.strategy();

        let dense = profile.dense(self.executor.corpus_size());
        let output = self.executor.infer(&dense.to_input())?;
        let full = strategy.score(
            output.item_logits.view(),
            output.rating_pred.view(),
            job.logit_weight,
        );

        let boosting = job.niche_boost_factor > 0.0 && self.popularity.is_some();
        let pool = if boosting {
            candidate_pool_size(job.top_k)
        } else {
            job.top_k
        };

        let mut recommendations: Vec<Recommendation> =
            select_top_k(full.scores.view(), dense.presence.view(), pool)
                .into_iter()
                .filter_map(|idx| {
                    Some(Recommendation {
                        item_id: self.corpus.id_of(idx)?,
                        corpus_idx: idx,
                        score: full.scores[idx],
                        probability: full.probabilities[idx],
                        predicted_rating: output.rating_pred[idx],
                        top_contributors: None,
                    })
                })
                .collect();

        if boosting {
            apply_niche_boost(
                &mut recommendations,
                self.popularity.as_deref(),
                job.niche_boost_factor,
            );
            recommendations.truncate(job.top_k);
        }

        let mut profile_holdout = None;
        if job.include_profile_holdout || job.include_contribution_analysis {
            let variants =
                HoldoutVariants::compute(&self.executor, profile, strategy, job.logit_weight)?;

            if job.include_contribution_analysis {
                attach_contributors(
                    &mut recommendations,
                    profile,
                    &variants,
                    full.scores.view(),
                    job.top_contributors,
                );
            }

            if job.include_profile_holdout {
                // impact is measured against the pre-boost full-profile scores
                let baseline: Vec<usize> = recommendations
                    .iter()
                    .take(IMPACT_BASELINE_SIZE)
                    .map(|r| r.corpus_idx)
                    .collect();
                profile_holdout = Some(holdout::analyze(
                    profile,
                    &variants,
                    &baseline,
                    full.scores.view(),
                ));
            }
        }

        tracing::info!(
            profile_items = profile.len(),
            recommendations = recommendations.len(),
            holdout = job.include_profile_holdout,
            contributions = job.include_contribution_analysis,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Inference job complete"
        );

        Ok(InferenceOutput {
            recommendations,
            profile_holdout,
        })
    }
}

/// Request-facing recommendation service
///
/// Validates and encodes requests on the caller's task, hands the heavy lifting to the
/// inference worker and caches successful responses.
#[derive(Clone)]
pub struct RecommendationService {
    corpus: Arc<Corpus>,
    policy: DroppedRatingPolicy,
    cache: ResponseCache,
    worker: InferenceWorker<InferenceJob, InferenceOutput>,
}

impl RecommendationService {
    /// Starts the inference worker that owns `engine`
    pub fn new(
        engine: RecommendationEngine,
        cache: ResponseCache,
        policy: DroppedRatingPolicy,
    ) -> AppResult<Self> {
        let corpus = engine.corpus().clone();
        let worker = InferenceWorker::spawn(move |job: InferenceJob| engine.run(job))?;

        Ok(Self {
            corpus,
            policy,
            cache,
            worker,
        })
    }

    pub fn corpus(&self) -> &Corpus {
        &self.corpus
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    pub async fn recommend(&self, request: RecommendRequest) -> AppResult<RecommendResponse> {
        cached!(
            self.cache,
            CacheKey::from_request(&request)?,
            self.compute(&request)
        )
    }

    async fn compute(&self, request: &RecommendRequest) -> AppResult<RecommendResponse> {
        if request.profile.is_empty() {
            return Err(AppError::InvalidInput(
                "profile must be a non-empty list".to_string(),
            ));
        }

        let profile = ProfileEncoder::new(&self.corpus, self.policy).encode(&request.profile)?;
        let normalization_stats = profile.stats.clone();

        let output = self
            .worker
            .submit(InferenceJob::new(profile, request))
            .await?;

        Ok(RecommendResponse {
            recommendations: output.recommendations,
            profile_holdout: output.profile_holdout,
            normalization_stats,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use ndarray::{s, Array1, Array2, ArrayView1};

    use super::*;
    use crate::model::{BatchOutput, MockRecommender, ModelOutput};
    use crate::models::ProfileEntry;
    use crate::services::scoring::{ScoringStrategy, ZScoreLinearBlend};

    const N: usize = 64;

    /// Logits rise with the corpus index, and every profile item lifts its neighbour
    fn heads(input: ArrayView1<'_, f32>) -> (Array1<f32>, Array1<f32>) {
        let presence = input.slice(s![..N]);
        let logits = Array1::from_shape_fn(N, |j| j as f32 * 0.05 + 2.0 * presence[(j + 1) % N]);
        let ratings = Array1::from_shape_fn(N, |j| ((j % 7) as f32 - 3.0) * 0.3);
        (logits, ratings)
    }

    fn model(single_calls: Arc<AtomicUsize>) -> MockRecommender {
        let mut model = MockRecommender::new();
        model.expect_corpus_size().return_const(N);
        model.expect_infer().returning(move |input| {
            single_calls.fetch_add(1, Ordering::SeqCst);
            let (item_logits, rating_pred) = heads(input.view());
            Ok(ModelOutput {
                item_logits,
                rating_pred,
            })
        });
        model.expect_infer_batch().returning(|inputs| {
            let mut item_logits = Array2::zeros((inputs.nrows(), N));
            let mut rating_pred = Array2::zeros((inputs.nrows(), N));
            for (r, row) in inputs.outer_iter().enumerate() {
                let (logits, ratings) = heads(row);
                item_logits.row_mut(r).assign(&logits);
                rating_pred.row_mut(r).assign(&ratings);
            }
            Ok(BatchOutput {
                item_logits,
                rating_pred,
            })
        });
        model
    }

    fn corpus() -> Arc<Corpus> {
        Arc::new(Corpus::from_ids((0..N as i64).map(|i| 900 + i).collect(), N).unwrap())
    }

    fn service_with(
        model: MockRecommender,
        popularity: Option<PopularityDistribution>,
    ) -> RecommendationService {
        let executor = BatchExecutor::new(Arc::new(model), 2);
        let engine =
            RecommendationEngine::new(executor, corpus(), popularity.map(Arc::new)).unwrap();
        RecommendationService::new(engine, ResponseCache::new(8), DroppedRatingPolicy::default())
            .unwrap()
    }

    fn entry(item_id: i64, rating: f32) -> ProfileEntry {
        ProfileEntry {
            item_id,
            rating,
            watch_status: "completed".to_string(),
        }
    }

    fn request(entries: Vec<ProfileEntry>, top_k: usize) -> RecommendRequest {
        RecommendRequest {
            top_k,
            ..RecommendRequest::new(entries)
        }
    }

    #[test]
    fn test_candidate_pool_size() {
        assert_eq!(candidate_pool_size(5), 15);
        assert_eq!(candidate_pool_size(200), 500);
        assert_eq!(candidate_pool_size(800), 800);
        assert_eq!(candidate_pool_size(0), 0);
    }

    #[test]
    fn test_engine_rejects_mismatched_corpus() {
        let executor = BatchExecutor::new(Arc::new(model(Arc::default())), 1);
        let corpus = Arc::new(Corpus::from_ids(vec![1, 2, 3], 3).unwrap());

        let result = RecommendationEngine::new(executor, corpus, None);

        assert!(matches!(result, Err(AppError::Config(_))));
    }

    #[tokio::test]
    async fn test_single_item_profile() {
        let service = service_with(model(Arc::default()), None);

        let response = service
            .recommend(request(vec![entry(942, 9.0)], 5))
            .await
            .unwrap();

        assert_eq!(response.recommendations.len(), 5);
        assert!(response.recommendations.iter().all(|r| r.corpus_idx != 42));
        assert!(response.recommendations.iter().all(|r| r.top_contributors.is_none()));
        assert!(response.profile_holdout.is_none());
        assert_eq!(response.normalization_stats.mu, 0.0);
        for pair in response.recommendations.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }

    #[tokio::test]
    async fn test_profile_items_are_never_recommended() {
        let service = service_with(model(Arc::default()), None);
        let profile: Vec<ProfileEntry> = (40..N as i64).map(|i| entry(900 + i, 7.0)).collect();

        let response = service.recommend(request(profile, N)).await.unwrap();

        assert_eq!(response.recommendations.len(), 40);
        assert!(response.recommendations.iter().all(|r| r.corpus_idx < 40));
    }

    #[tokio::test]
    async fn test_identical_requests_hit_the_cache() {
        let calls = Arc::new(AtomicUsize::new(0));
        let service = service_with(model(calls.clone()), None);
        let req = request(vec![entry(910, 8.0), entry(920, 4.0)], 10);

        let first = service.recommend(req.clone()).await.unwrap();
        let second = service.recommend(req).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(service.cache().len(), 1);
    }

    #[tokio::test]
    async fn test_empty_profile_is_rejected() {
        let calls = Arc::new(AtomicUsize::new(0));
        let service = service_with(model(calls.clone()), None);

        let result = service.recommend(request(vec![], 5)).await;

        match result {
            Err(AppError::InvalidInput(msg)) => assert_eq!(msg, "profile must be a non-empty list"),
            _ => panic!("expected validation error"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(service.cache().is_empty());
    }

    #[tokio::test]
    async fn test_profile_without_valid_entries_is_rejected() {
        let service = service_with(model(Arc::default()), None);

        let result = service.recommend(request(vec![entry(1, 9.0)], 5)).await;

        assert!(matches!(result, Err(AppError::InvalidInput(_))));
        assert!(service.cache().is_empty());
    }

    #[tokio::test]
    async fn test_holdout_and_contributions() {
        let service = service_with(model(Arc::default()), None);
        let req = RecommendRequest {
            include_profile_holdout: true,
            include_contribution_analysis: true,
            top_contributors: 2,
            ..request(vec![entry(910, 9.0), entry(921, 5.0), entry(963, 7.0)], 10)
        };

        let response = service.recommend(req).await.unwrap();

        let holdout = response.profile_holdout.unwrap();
        let held: Vec<usize> = holdout.items.iter().map(|r| r.corpus_idx).collect();
        assert_eq!(held, vec![10, 21, 63]);
        for item in &holdout.items {
            assert!(item.impact_score >= 0.0);
            assert!(item.rating_error >= 0.0);
        }

        for recommendation in &response.recommendations {
            let contributors = recommendation.top_contributors.as_ref().unwrap();
            assert!(contributors.len() <= 2);
        }
        // item 62 is lifted by profile item 63
        let lifted = response
            .recommendations
            .iter()
            .find(|r| r.corpus_idx == 62)
            .unwrap();
        assert_eq!(lifted.top_contributors.as_ref().unwrap()[0].item_id, 963);
    }

    #[tokio::test]
    async fn test_holdout_scores_use_the_requested_ranking() {
        let service = service_with(model(Arc::default()), None);
        let entries = vec![entry(910, 9.0), entry(921, 5.0), entry(963, 7.0)];
        let holdout_request = |use_alt_ranking| RecommendRequest {
            include_profile_holdout: true,
            use_alt_ranking,
            logit_weight: Some(0.4),
            ..request(entries.clone(), 10)
        };

        let alt = service.recommend(holdout_request(true)).await.unwrap();
        let default = service.recommend(holdout_request(false)).await.unwrap();

        let profile = ProfileEncoder::new(&corpus(), DroppedRatingPolicy::default())
            .encode(&entries)
            .unwrap();
        let batch = profile.holdout_batch(N);
        let alt_items = alt.profile_holdout.unwrap().items;
        let default_items = default.profile_holdout.unwrap().items;
        for (i, (alt_item, default_item)) in alt_items.iter().zip(&default_items).enumerate() {
            let (logits, ratings) = heads(batch.row(i));
            let expected = ZScoreLinearBlend.score(logits.view(), ratings.view(), 0.4);
            assert_eq!(alt_item.recommendation_score, expected.scores[alt_item.corpus_idx]);
            assert_ne!(alt_item.recommendation_score, default_item.recommendation_score);
            assert_eq!(alt_item.presence_probability, default_item.presence_probability);
        }
    }

    #[tokio::test]
    async fn test_niche_boost_keeps_top_k() {
        let counts: Vec<f64> = (0..N).map(|j| (j + 1) as f64 * 10.0).collect();
        let popularity = PopularityDistribution::from_counts(&counts);
        let service = service_with(model(Arc::default()), popularity);
        let req = RecommendRequest {
            niche_boost_factor: 0.9,
            ..request(vec![entry(910, 9.0)], 5)
        };

        let response = service.recommend(req).await.unwrap();

        assert_eq!(response.recommendations.len(), 5);
        for pair in response.recommendations.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }

    #[tokio::test]
    async fn test_model_failure_is_not_cached() {
        let mut failing = MockRecommender::new();
        failing.expect_corpus_size().return_const(N);
        failing
            .expect_infer()
            .returning(|_| Err(crate::model::ModelError::Inference("boom".to_string())));
        let service = service_with(failing, None);

        let result = service.recommend(request(vec![entry(910, 9.0)], 5)).await;

        assert!(matches!(result, Err(AppError::Model(_))));
        assert!(service.cache().is_empty());
    }
}
