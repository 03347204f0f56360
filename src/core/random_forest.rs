//! Random forest regression over station feature vectors

use crate::types::{
    Cell, PredictionSurface, PredictorStack, TairError, TairResult, TrainingFeature,
};
use ndarray::{Array2, Zip};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Forest hyper-parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForestParams {
    /// Ensemble size
    pub n_trees: usize,
    /// Predictors tried at each split; `None` means floor(sqrt(#predictors))
    pub variables_per_split: Option<usize>,
    /// Smallest number of rows a leaf may hold
    pub min_leaf_population: usize,
    /// Bootstrap sample size as a fraction of the usable rows (drawn with replacement)
    pub bag_fraction: f64,
    /// Upper bound on nodes per tree
    pub max_nodes: Option<usize>,
    pub seed: u64,
}

impl Default for RandomForestParams {
    fn default() -> Self {
        Self {
            n_trees: 50,
            variables_per_split: None,
            min_leaf_population: 1,
            bag_fraction: 0.5,
            max_nodes: None,
            seed: 0,
        }
    }
}

impl RandomForestParams {
    pub fn validate(&self) -> TairResult<()> {
        if self.n_trees == 0 {
            return Err(TairError::Config("Forest needs at least one tree".to_string()));
        }
        if self.min_leaf_population == 0 {
            return Err(TairError::Config("Minimum leaf population must be >= 1".to_string()));
        }
        if !(self.bag_fraction > 0.0 && self.bag_fraction <= 1.0) {
            return Err(TairError::Config(format!(
                "Bag fraction must be in (0, 1], got {}",
                self.bag_fraction
            )));
        }
        if self.variables_per_split == Some(0) {
            return Err(TairError::Config("Variables per split must be >= 1".to_string()));
        }
        if matches!(self.max_nodes, Some(n) if n == 0) {
            return Err(TairError::Config("Max nodes must be >= 1".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum Node {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

/// CART regression tree stored as a flat node arena, root at index 0
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionTree {
    nodes: Vec<Node>,
}

impl RegressionTree {
    pub fn predict(&self, values: &[f64]) -> f64 {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                Node::Leaf { value } => return *value,
                Node::Split { feature, threshold, left, right } => {
                    idx = if values[*feature] <= *threshold { *left } else { *right };
                }
            }
        }
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn depth(&self) -> usize {
        fn walk(nodes: &[Node], idx: usize) -> usize {
            match &nodes[idx] {
                Node::Leaf { .. } => 1,
                Node::Split { left, right, .. } => 1 + walk(nodes, *left).max(walk(nodes, *right)),
            }
        }
        walk(&self.nodes, 0)
    }
}

/// Fitted ensemble mapping predictor vectors to the response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainedModel {
    pub response: String,
    pub predictors: Vec<String>,
    pub training_rows: usize,
    trees: Vec<RegressionTree>,
    importance: Vec<f64>,
}

impl TrainedModel {
    pub fn trees(&self) -> &[RegressionTree] {
        &self.trees
    }

    /// A model fitted on zero usable rows predicts nothing
    pub fn is_degenerate(&self) -> bool {
        self.trees.is_empty()
    }

    /// Total within-node squared error removed by each predictor's splits
    pub fn importance(&self) -> BTreeMap<String, f64> {
        self.predictors
            .iter()
            .cloned()
            .zip(self.importance.iter().copied())
            .collect()
    }

    /// Mean of all tree outputs; `None` if any value is missing
    pub fn predict_row(&self, values: &[f64]) -> Option<f64> {
        if self.trees.is_empty()
            || values.len() != self.predictors.len()
            || values.iter().any(|v| !v.is_finite())
        {
            return None;
        }
        let sum: f64 = self.trees.iter().map(|t| t.predict(values)).sum();
        Some(sum / self.trees.len() as f64)
    }

    /// Apply the model to every pixel of the stack.
    ///
    /// The stack's band-name set must equal the training predictor set
    /// exactly; bands are matched by name, never by position.
    pub fn predict(&self, stack: &PredictorStack) -> TairResult<PredictionSurface> {
        let expected: BTreeSet<&str> = self.predictors.iter().map(String::as_str).collect();
        let found_names = stack.band_names();
        let found: BTreeSet<&str> = found_names.iter().map(String::as_str).collect();
        if expected != found || found_names.len() != self.predictors.len() {
            return Err(TairError::SchemaMismatch {
                expected: self.predictors.clone(),
                found: found_names,
            });
        }

        let layers: Vec<&Array2<Cell>> = self
            .predictors
            .iter()
            .filter_map(|name| stack.band(name).map(|b| &b.data))
            .collect();

        log::info!(
            "Predicting {} on {}x{} grid with {} trees",
            self.response,
            stack.grid.width,
            stack.grid.height,
            self.trees.len()
        );

        let mut data = Array2::<Cell>::from_elem(stack.grid.shape(), Cell::NAN);
        Zip::indexed(&mut data).par_for_each(|idx, out| {
            let values: Vec<f64> = layers.iter().map(|l| l[idx] as f64).collect();
            if let Some(v) = self.predict_row(&values) {
                *out = v as Cell;
            }
        });

        Ok(PredictionSurface {
            name: self.response.clone(),
            grid: stack.grid.clone(),
            data,
        })
    }
}

/// Bagged random-subspace regression forest trainer
pub struct RandomForestTrainer {
    params: RandomForestParams,
}

impl RandomForestTrainer {
    pub fn new(params: RandomForestParams) -> Self {
        Self { params }
    }

    /// Fit the forest on rows carrying a finite response and every predictor.
    ///
    /// Rows with any missing value are excluded. No minimum row count is
    /// enforced: too few rows give a weak or degenerate model.
    pub fn train(
        &self,
        features: &[TrainingFeature],
        response: &str,
        predictors: &[String],
    ) -> TairResult<TrainedModel> {
        self.params.validate()?;
        if predictors.is_empty() {
            return Err(TairError::Processing("No predictor bands given".to_string()));
        }
        let unique: BTreeSet<&String> = predictors.iter().collect();
        if unique.len() != predictors.len() {
            return Err(TairError::Processing(format!(
                "Duplicate predictor names in {:?}",
                predictors
            )));
        }

        let mut x = Vec::with_capacity(features.len());
        let mut y = Vec::with_capacity(features.len());
        for feature in features {
            match (feature.get(response).filter(|v| v.is_finite()), feature.values(predictors)) {
                (Some(target), Some(row)) => {
                    x.push(row);
                    y.push(target);
                }
                _ => log::debug!("Excluding station {} from training", feature.station_id),
            }
        }

        let excluded = features.len() - x.len();
        if excluded > 0 {
            log::warn!(
                "{} of {} training features excluded for missing values",
                excluded,
                features.len()
            );
        }

        let p = predictors.len();
        if x.is_empty() {
            log::warn!("No usable training rows; model will predict nothing");
            return Ok(TrainedModel {
                response: response.to_string(),
                predictors: predictors.to_vec(),
                training_rows: 0,
                trees: Vec::new(),
                importance: vec![0.0; p],
            });
        }
        if x.len() <= p {
            log::warn!(
                "Only {} training rows for {} predictors; expect a weak model",
                x.len(),
                p
            );
        }

        let mtry = self
            .params
            .variables_per_split
            .unwrap_or_else(|| (p as f64).sqrt().floor() as usize)
            .clamp(1, p);
        log::info!(
            "Training {} trees on {} rows, {} predictors ({} per split)",
            self.params.n_trees,
            x.len(),
            p,
            mtry
        );

        let grow = |t: usize| {
            let mut builder = TreeBuilder::new(&x, &y, &self.params, mtry, tree_seed(self.params.seed, t));
            builder.build()
        };

        #[cfg(feature = "parallel")]
        let grown: Vec<(RegressionTree, Vec<f64>)> = (0..self.params.n_trees).into_par_iter().map(grow).collect();
        #[cfg(not(feature = "parallel"))]
        let grown: Vec<(RegressionTree, Vec<f64>)> = (0..self.params.n_trees).map(grow).collect();

        let mut importance = vec![0.0; p];
        let mut trees = Vec::with_capacity(grown.len());
        for (tree, gains) in grown {
            for (total, gain) in importance.iter_mut().zip(gains) {
                *total += gain;
            }
            trees.push(tree);
        }

        let model = TrainedModel {
            response: response.to_string(),
            predictors: predictors.to_vec(),
            training_rows: x.len(),
            trees,
            importance,
        };
        for (name, gain) in model.importance() {
            log::debug!("Importance {}: {:.4}", name, gain);
        }
        Ok(model)
    }
}

fn tree_seed(seed: u64, tree: usize) -> u64 {
    seed ^ (tree as u64 + 1).wrapping_mul(0x9E37_79B9_7F4A_7C15)
}

struct TreeBuilder<'a> {
    x: &'a [Vec<f64>],
    y: &'a [f64],
    params: &'a RandomForestParams,
    mtry: usize,
    rng: StdRng,
    nodes: Vec<Node>,
    /// Child nodes promised by splits but not yet pushed
    pending: usize,
    importance: Vec<f64>,
}

struct BestSplit {
    feature: usize,
    threshold: f64,
    gain: f64,
}

impl<'a> TreeBuilder<'a> {
    fn new(
        x: &'a [Vec<f64>],
        y: &'a [f64],
        params: &'a RandomForestParams,
        mtry: usize,
        seed: u64,
    ) -> Self {
        let p = x.first().map_or(0, |r| r.len());
        Self {
            x,
            y,
            params,
            mtry,
            rng: StdRng::seed_from_u64(seed),
            nodes: Vec::new(),
            pending: 0,
            importance: vec![0.0; p],
        }
    }

    fn build(mut self) -> (RegressionTree, Vec<f64>) {
        let n = self.y.len();
        let sample_size = ((n as f64 * self.params.bag_fraction).round() as usize).max(1);
        let mut sample: Vec<usize> = (0..sample_size).map(|_| self.rng.gen_range(0..n)).collect();

        self.grow(&mut sample, false);
        (RegressionTree { nodes: self.nodes }, self.importance)
    }

    fn grow(&mut self, rows: &mut [usize], promised: bool) -> usize {
        let node_id = self.nodes.len();
        let mean = rows.iter().map(|&r| self.y[r]).sum::<f64>() / rows.len() as f64;
        self.nodes.push(Node::Leaf { value: mean });
        if promised {
            self.pending -= 1;
        }

        let room = self
            .params
            .max_nodes
            .map_or(true, |max| self.nodes.len() + self.pending + 2 <= max);
        if !room || rows.len() < 2 * self.params.min_leaf_population {
            return node_id;
        }

        let Some(best) = self.best_split(rows) else {
            return node_id;
        };

        self.importance[best.feature] += best.gain;
        self.pending += 2;
        let x = self.x;
        let (left_rows, right_rows) = partition(rows, |r| x[r][best.feature] <= best.threshold);
        let left = self.grow(left_rows, true);
        let right = self.grow(right_rows, true);
        self.nodes[node_id] = Node::Split {
            feature: best.feature,
            threshold: best.threshold,
            left,
            right,
        };
        node_id
    }

    fn best_split(&mut self, rows: &[usize]) -> Option<BestSplit> {
        let p = self.importance.len();
        let mut candidates: Vec<usize> =
            rand::seq::index::sample(&mut self.rng, p, self.mtry).into_iter().collect();
        candidates.sort_unstable();

        let n = rows.len();
        let total_sum: f64 = rows.iter().map(|&r| self.y[r]).sum();
        let total_sq: f64 = rows.iter().map(|&r| self.y[r] * self.y[r]).sum();
        let parent_sse = total_sq - total_sum * total_sum / n as f64;
        if parent_sse <= 1e-12 {
            return None;
        }

        let min_leaf = self.params.min_leaf_population;
        let mut best: Option<BestSplit> = None;
        let mut pairs: Vec<(f64, f64)> = Vec::with_capacity(n);

        for feature in candidates {
            pairs.clear();
            pairs.extend(rows.iter().map(|&r| (self.x[r][feature], self.y[r])));
            pairs.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

            let mut left_sum = 0.0;
            let mut left_sq = 0.0;
            for k in 1..n {
                let (v_prev, y_prev) = pairs[k - 1];
                left_sum += y_prev;
                left_sq += y_prev * y_prev;

                let v_next = pairs[k].0;
                if k < min_leaf || n - k < min_leaf || !(v_prev < v_next) {
                    continue;
                }

                let nl = k as f64;
                let nr = (n - k) as f64;
                let right_sum = total_sum - left_sum;
                let right_sq = total_sq - left_sq;
                let sse = (left_sq - left_sum * left_sum / nl) + (right_sq - right_sum * right_sum / nr);
                let gain = parent_sse - sse;

                if gain > 1e-12 && best.as_ref().map_or(true, |b| gain > b.gain) {
                    let mut threshold = 0.5 * (v_prev + v_next);
                    if !(threshold < v_next) {
                        threshold = v_prev;
                    }
                    best = Some(BestSplit { feature, threshold, gain });
                }
            }
        }

        best
    }
}

/// Stable in-place split of `rows` into (matching, rest)
fn partition<F: Fn(usize) -> bool>(rows: &mut [usize], goes_left: F) -> (&mut [usize], &mut [usize]) {
    let (mut left, mut right): (Vec<usize>, Vec<usize>) = rows.iter().partition(|&&r| goes_left(r));
    let split = left.len();
    left.append(&mut right);
    rows.copy_from_slice(&left);
    rows.split_at_mut(split)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Band, GeoTransform, GridSpec};
    use approx::assert_abs_diff_eq;

    fn feature(id: &str, ta: Option<f64>, values: &[(&str, Option<f64>)]) -> TrainingFeature {
        let mut properties = BTreeMap::new();
        properties.insert("ta".to_string(), ta);
        for (name, v) in values {
            properties.insert(name.to_string(), *v);
        }
        TrainingFeature {
            station_id: id.to_string(),
            x: 0.0,
            y: 0.0,
            properties,
        }
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn step_features() -> Vec<TrainingFeature> {
        (0..40)
            .map(|i| {
                let elev = i as f64 * 10.0;
                let ta = if elev < 200.0 { 10.0 } else { 4.0 };
                feature(&format!("s{}", i), Some(ta), &[("elevation", Some(elev)), ("noise", Some((i % 7) as f64))])
            })
            .collect()
    }

    #[test]
    fn test_learns_step_function() {
        let trainer = RandomForestTrainer::new(RandomForestParams {
            n_trees: 30,
            bag_fraction: 1.0,
            ..Default::default()
        });
        let model = trainer
            .train(&step_features(), "ta", &names(&["elevation", "noise"]))
            .unwrap();

        assert_eq!(model.training_rows, 40);
        assert!(model.predict_row(&[20.0, 2.0]).unwrap() > 8.0);
        assert!(model.predict_row(&[380.0, 3.0]).unwrap() < 6.0);

        let importance = model.importance();
        assert!(importance["elevation"] > importance["noise"]);
    }

    #[test]
    fn test_predictions_stay_within_training_range() {
        let features = vec![
            feature("a", Some(8.0), &[("b1", Some(1.0))]),
            feature("b", Some(9.0), &[("b1", Some(1.0))]),
            feature("c", Some(9.5), &[("b1", Some(1.0))]),
        ];
        let model = RandomForestTrainer::new(RandomForestParams::default())
            .train(&features, "ta", &names(&["b1"]))
            .unwrap();
        let v = model.predict_row(&[1.0]).unwrap();
        assert!((8.0..=9.5).contains(&v));
    }

    #[test]
    fn test_rows_with_missing_values_excluded() {
        let features = vec![
            feature("a", Some(8.0), &[("b1", Some(1.0))]),
            feature("b", None, &[("b1", Some(2.0))]),
            feature("c", Some(9.0), &[("b1", None)]),
        ];
        let model = RandomForestTrainer::new(RandomForestParams::default())
            .train(&features, "ta", &names(&["b1"]))
            .unwrap();
        assert_eq!(model.training_rows, 1);
        assert_abs_diff_eq!(model.predict_row(&[5.0]).unwrap(), 8.0);
    }

    #[test]
    fn test_no_usable_rows_gives_degenerate_model() {
        let features = vec![feature("a", None, &[("b1", Some(1.0))])];
        let model = RandomForestTrainer::new(RandomForestParams::default())
            .train(&features, "ta", &names(&["b1"]))
            .unwrap();
        assert!(model.is_degenerate());
        assert_eq!(model.predict_row(&[1.0]), None);
    }

    #[test]
    fn test_training_is_deterministic() {
        let trainer = RandomForestTrainer::new(RandomForestParams { seed: 7, ..Default::default() });
        let predictors = names(&["elevation", "noise"]);
        let a = trainer.train(&step_features(), "ta", &predictors).unwrap();
        let b = trainer.train(&step_features(), "ta", &predictors).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_max_nodes_limits_tree_size() {
        let trainer = RandomForestTrainer::new(RandomForestParams {
            n_trees: 5,
            max_nodes: Some(3),
            ..Default::default()
        });
        let model = trainer.train(&step_features(), "ta", &names(&["elevation", "noise"])).unwrap();
        assert!(model.trees().iter().all(|t| t.node_count() <= 3 && t.depth() <= 2));
    }

    #[test]
    fn test_schema_mismatch_is_fatal() {
        let features = vec![feature("a", Some(8.0), &[("b1", Some(1.0)), ("b2", Some(2.0))])];
        let model = RandomForestTrainer::new(RandomForestParams::default())
            .train(&features, "ta", &names(&["b1", "b2"]))
            .unwrap();

        let grid = GridSpec::new(2, 2, GeoTransform::north_up(0.0, 20.0, 10.0, 10.0), None);
        let stack = PredictorStack::from_bands(
            grid,
            vec![
                Band::new("b1", Array2::from_elem((2, 2), 1.0)),
                Band::new("b3", Array2::from_elem((2, 2), 2.0)),
            ],
        )
        .unwrap();

        assert!(matches!(model.predict(&stack), Err(TairError::SchemaMismatch { .. })));
    }

    #[test]
    fn test_predict_matches_bands_by_name() {
        let features: Vec<TrainingFeature> = (0..20)
            .map(|i| {
                let a = i as f64;
                feature(&format!("s{}", i), Some(a), &[("a", Some(a)), ("b", Some(100.0))])
            })
            .collect();
        let model = RandomForestTrainer::new(RandomForestParams {
            variables_per_split: Some(2),
            bag_fraction: 1.0,
            ..Default::default()
        })
        .train(&features, "ta", &names(&["a", "b"]))
        .unwrap();

        // Bands in reverse order, one missing pixel
        let grid = GridSpec::new(2, 1, GeoTransform::north_up(0.0, 10.0, 10.0, 10.0), None);
        let stack = PredictorStack::from_bands(
            grid,
            vec![
                Band::new("b", Array2::from_elem((1, 2), 100.0)),
                Band::new("a", Array2::from_shape_vec((1, 2), vec![2.0, f32::NAN]).unwrap()),
            ],
        )
        .unwrap();

        let surface = model.predict(&stack).unwrap();
        assert!(surface.data[[0, 0]] < 6.0);
        assert!(surface.data[[0, 1]].is_nan());
    }
}
