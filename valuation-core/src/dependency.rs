//! Resource-dependency algebra: combining per-dimension valuations into one
//! joint surface.
//!
//! Global rules reduce all dimension meshes with one elementwise operator.
//! Dependency trees merge dimension slots pairwise, per player, in a stored
//! order; they are validated once when built or loaded, so executing one
//! cannot fail on a well-formed request.

use std::collections::BTreeMap;

use ndarray::{Array1, ArrayD, IxDyn, Zip};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{Result, ValuationError};

/// Elementwise combination operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Combine {
    /// Resources only useful together: minimum.
    #[serde(rename = "c", alias = "C", alias = "complementary")]
    Complementary,
    /// Resources replace each other: maximum.
    #[serde(rename = "s", alias = "S", alias = "substitute")]
    Substitute,
    /// Product.
    #[serde(rename = "m", alias = "M", alias = "multiply")]
    Multiply,
}

/// Rule names accepted by [`Combine::from_name`] (case-insensitive).
const RULES: &[(&str, Combine)] = &[
    ("complementary", Combine::Complementary),
    ("c", Combine::Complementary),
    ("substitute", Combine::Substitute),
    ("s", Combine::Substitute),
    ("multiply", Combine::Multiply),
    ("m", Combine::Multiply),
];

impl Combine {
    pub fn from_name(name: &str) -> Option<Self> {
        let lower = name.to_ascii_lowercase();
        RULES.iter().find(|(n, _)| *n == lower).map(|(_, c)| *c)
    }

    pub fn name(self) -> &'static str {
        match self {
            Combine::Complementary => "complementary",
            Combine::Substitute => "substitute",
            Combine::Multiply => "multiply",
        }
    }

    pub fn eval(self, a: f64, b: f64) -> f64 {
        match self {
            Combine::Complementary => a.min(b),
            Combine::Substitute => a.max(b),
            Combine::Multiply => a * b,
        }
    }

    /// Combine `other` into `acc` elementwise. Shapes must match.
    pub fn combine(self, mut acc: ArrayD<f64>, other: &ArrayD<f64>) -> ArrayD<f64> {
        Zip::from(&mut acc)
            .and(other)
            .for_each(|a, &b| *a = self.eval(*a, b));
        acc
    }
}

/// How a request combines dimensions: a global rule or a stored tree family.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceDependency {
    Elementwise(Combine),
    Named(String),
}

impl Default for ResourceDependency {
    fn default() -> Self {
        ResourceDependency::Elementwise(Combine::Multiply)
    }
}

impl ResourceDependency {
    /// Built-in rule names first, anything else refers to a stored tree family.
    pub fn parse(name: &str) -> Self {
        match Combine::from_name(name) {
            Some(op) => ResourceDependency::Elementwise(op),
            None => ResourceDependency::Named(name.to_string()),
        }
    }

    pub fn label(&self) -> &str {
        match self {
            ResourceDependency::Elementwise(op) => op.name(),
            ResourceDependency::Named(name) => name,
        }
    }
}

impl From<&str> for ResourceDependency {
    fn from(name: &str) -> Self {
        Self::parse(name)
    }
}

impl From<Combine> for ResourceDependency {
    fn from(op: Combine) -> Self {
        ResourceDependency::Elementwise(op)
    }
}

/// Storage key for a tree family.
pub fn dependency_key(name: &str) -> String {
    format!("resource_dependency_{name}")
}

/// `ij`-indexed mesh: slice `d` broadcast along every other axis.
pub fn mesh(slices: &[Array1<f64>]) -> Vec<ArrayD<f64>> {
    let shape: Vec<usize> = slices.iter().map(|s| s.len()).collect();
    slices
        .iter()
        .enumerate()
        .map(|(d, s)| ArrayD::from_shape_fn(IxDyn(&shape), |idx| s[idx[d]]))
        .collect()
}

/// Reduce the mesh of `slices` left to right with `op`.
pub fn compose_elementwise(op: Combine, slices: &[Array1<f64>]) -> Result<ArrayD<f64>> {
    mesh(slices)
        .into_iter()
        .reduce(|acc, m| op.combine(acc, &m))
        .ok_or_else(|| ValuationError::DimensionMismatch("no slices to compose".to_string()))
}

/// One merge: slot `from` is combined into slot `into`, consuming both.
///
/// Serialized as `[op, [from, into]]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "(Combine, (usize, usize))", into = "(Combine, (usize, usize))")]
pub struct DependencyStep {
    pub op: Combine,
    pub from: usize,
    pub into: usize,
}

impl From<(Combine, (usize, usize))> for DependencyStep {
    fn from((op, (from, into)): (Combine, (usize, usize))) -> Self {
        Self { op, from, into }
    }
}

impl From<DependencyStep> for (Combine, (usize, usize)) {
    fn from(step: DependencyStep) -> Self {
        (step.op, (step.from, step.into))
    }
}

/// A per-player reduction over `ndim` dimension slots.
///
/// Invariant: every step merges two distinct live slots, and exactly one slot
/// (the root) is live after the last step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<DependencyStep>", into = "Vec<DependencyStep>")]
pub struct DependencyTree {
    ndim: usize,
    steps: Vec<DependencyStep>,
    root: usize,
}

impl DependencyTree {
    pub fn new(ndim: usize, steps: Vec<DependencyStep>) -> Result<Self> {
        let root = validate(ndim, &steps)?;
        Ok(Self { ndim, steps, root })
    }

    pub fn ndim(&self) -> usize {
        self.ndim
    }

    pub fn steps(&self) -> &[DependencyStep] {
        &self.steps
    }

    pub fn root(&self) -> usize {
        self.root
    }

    /// Execute over the meshes of the first `meshes.len()` dimensions.
    ///
    /// Slots beyond the requested dimensions start empty. A step with one
    /// empty operand passes the other through unchanged, and a step with two
    /// leaves its destination empty, so a tree built for D dimensions also
    /// reduces any prefix of them.
    pub fn reduce(&self, meshes: Vec<ArrayD<f64>>) -> Result<ArrayD<f64>> {
        if meshes.is_empty() || meshes.len() > self.ndim {
            return Err(ValuationError::DimensionMismatch(format!(
                "tree over {} dimensions cannot reduce {} meshes",
                self.ndim,
                meshes.len()
            )));
        }

        let mut slots: Vec<Option<ArrayD<f64>>> = meshes.into_iter().map(Some).collect();
        slots.resize_with(self.ndim, || None);

        for step in &self.steps {
            let a = slots[step.from].take();
            let b = slots[step.into].take();
            slots[step.into] = match (a, b) {
                (Some(a), Some(b)) => Some(step.op.combine(a, &b)),
                (Some(x), None) | (None, Some(x)) => Some(x),
                (None, None) => None,
            };
        }

        slots[self.root].take().ok_or_else(|| {
            ValuationError::MalformedDependencyTree(format!("root slot {} ended empty", self.root))
        })
    }

    /// Mesh `slices` and reduce them.
    pub fn compose(&self, slices: &[Array1<f64>]) -> Result<ArrayD<f64>> {
        self.reduce(mesh(slices))
    }
}

/// Returns the root slot of a well-formed tree.
fn validate(ndim: usize, steps: &[DependencyStep]) -> Result<usize> {
    let malformed = |msg: String| Err(ValuationError::MalformedDependencyTree(msg));
    if ndim == 0 {
        return malformed("a tree needs at least one dimension".to_string());
    }

    let mut live = vec![true; ndim];
    for (k, step) in steps.iter().enumerate() {
        if step.from >= ndim || step.into >= ndim {
            return malformed(format!(
                "step {k} merges {} into {} outside {ndim} dimensions",
                step.from, step.into
            ));
        }
        if step.from == step.into {
            return malformed(format!("step {k} merges slot {} into itself", step.from));
        }
        for slot in [step.from, step.into] {
            if !live[slot] {
                return malformed(format!("step {k} uses consumed slot {slot}"));
            }
        }
        live[step.from] = false;
    }

    let remaining: Vec<usize> = (0..ndim).filter(|&i| live[i]).collect();
    match remaining.as_slice() {
        [root] => Ok(*root),
        _ => malformed(format!(
            "{} slots remain live after {} steps: {:?}",
            remaining.len(),
            steps.len(),
            remaining
        )),
    }
}

impl TryFrom<Vec<DependencyStep>> for DependencyTree {
    type Error = ValuationError;

    /// A well-formed tree over D dimensions has exactly D - 1 steps.
    fn try_from(steps: Vec<DependencyStep>) -> Result<Self> {
        Self::new(steps.len() + 1, steps)
    }
}

impl From<DependencyTree> for Vec<DependencyStep> {
    fn from(tree: DependencyTree) -> Self {
        tree.steps
    }
}

/// A weighted operator mix for random tree generation.
#[derive(Debug, Clone, Copy)]
pub struct TreeFamily {
    pub name: &'static str,
    pub weights: &'static [(Combine, f64)],
}

pub const TREE_FAMILIES: &[TreeFamily] = &[
    TreeFamily {
        name: "cs",
        weights: &[(Combine::Complementary, 0.7), (Combine::Substitute, 0.3)],
    },
    TreeFamily {
        name: "csm",
        weights: &[
            (Combine::Complementary, 0.6),
            (Combine::Substitute, 0.3),
            (Combine::Multiply, 0.1),
        ],
    },
    TreeFamily {
        name: "sm",
        weights: &[(Combine::Substitute, 0.3), (Combine::Multiply, 0.7)],
    },
];

fn weighted_pick<R: Rng>(rng: &mut R, weights: &[(Combine, f64)]) -> Combine {
    let total: f64 = weights.iter().map(|(_, w)| w).sum();
    let mut r = rng.random::<f64>() * total;
    for &(op, w) in weights {
        if r < w {
            return op;
        }
        r -= w;
    }
    weights.last().map_or(Combine::Multiply, |(op, _)| *op)
}

/// Random tree: draw D-1 operators, then repeatedly merge a random live slot
/// into another random live slot.
pub fn random_tree<R: Rng>(rng: &mut R, ndim: usize, weights: &[(Combine, f64)]) -> DependencyTree {
    let ndim = ndim.max(1);
    let mut ops: Vec<Combine> = (1..ndim).map(|_| weighted_pick(rng, weights)).collect();
    let mut live: Vec<usize> = (0..ndim).collect();
    let mut steps = Vec::with_capacity(ndim - 1);

    while live.len() > 1 {
        let picked = rand::seq::index::sample(rng, live.len(), 2);
        let (a, b) = (picked.index(0), picked.index(1));
        let op = ops.pop().unwrap_or(Combine::Multiply);
        steps.push(DependencyStep {
            op,
            from: live[a],
            into: live[b],
        });
        live.remove(a);
    }

    DependencyTree {
        ndim,
        steps,
        root: live[0],
    }
}

/// One tree per player for every family in [`TREE_FAMILIES`], keyed by [`dependency_key`].
pub fn generate_trees<R: Rng>(rng: &mut R, n: usize, ndim: usize) -> BTreeMap<String, Vec<DependencyTree>> {
    TREE_FAMILIES
        .iter()
        .map(|family| {
            let trees = (0..n).map(|_| random_tree(rng, ndim, family.weights)).collect();
            (dependency_key(family.name), trees)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr1, arr2};
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn step(op: Combine, from: usize, into: usize) -> DependencyStep {
        DependencyStep { op, from, into }
    }

    #[test]
    fn test_rule_names() {
        assert_eq!(Combine::from_name("Complementary"), Some(Combine::Complementary));
        assert_eq!(Combine::from_name("s"), Some(Combine::Substitute));
        assert_eq!(Combine::from_name("M"), Some(Combine::Multiply));
        assert_eq!(Combine::from_name("cs"), None);

        assert_eq!(ResourceDependency::parse("c"), Combine::Complementary.into());
        assert_eq!(
            ResourceDependency::parse("csm"),
            ResourceDependency::Named("csm".to_string())
        );
        assert_eq!(ResourceDependency::default(), Combine::Multiply.into());
    }

    #[test]
    fn test_mesh_shapes() {
        let m = mesh(&[arr1(&[1.0, 2.0]), arr1(&[10.0, 20.0, 30.0])]);
        assert_eq!(m[0].shape(), &[2, 3]);
        assert_eq!(m[0][[1, 2]], 2.0);
        assert_eq!(m[1][[1, 2]], 30.0);
    }

    #[test]
    fn test_complementary_on_three_by_three() {
        let a = arr1(&[0.0, 0.5, 1.0]);
        let surface = compose_elementwise(Combine::Complementary, &[a.clone(), a]).unwrap();
        let expected = arr2(&[[0.0, 0.0, 0.0], [0.0, 0.5, 0.5], [0.0, 0.5, 1.0]]).into_dyn();
        assert_eq!(surface, expected);
    }

    #[test]
    fn test_elementwise_modes_against_outer_ops() {
        let a = arr1(&[0.0, 0.5, 1.0]);
        let b = arr1(&[1.0, 0.5, 0.0]);
        let slices = [a.clone(), b.clone()];

        for op in [Combine::Complementary, Combine::Substitute, Combine::Multiply] {
            let surface = compose_elementwise(op, &slices).unwrap();
            for i in 0..3 {
                for j in 0..3 {
                    assert_eq!(surface[[i, j]], op.eval(a[i], b[j]), "{:?} at ({}, {})", op, i, j);
                }
            }
        }

        let min = compose_elementwise(Combine::Complementary, &slices).unwrap();
        assert_eq!(
            min,
            arr2(&[[0.0, 0.0, 0.0], [0.5, 0.5, 0.0], [1.0, 0.5, 0.0]]).into_dyn()
        );
    }

    #[test]
    fn test_single_slice_unchanged() {
        let a = arr1(&[0.1, 0.4, 0.9]);
        for op in [Combine::Complementary, Combine::Substitute, Combine::Multiply] {
            assert_eq!(compose_elementwise(op, &[a.clone()]).unwrap(), a.clone().into_dyn());
        }
        let tree = DependencyTree::new(1, vec![]).unwrap();
        assert_eq!(tree.compose(&[a.clone()]).unwrap(), a.into_dyn());
    }

    #[test]
    fn test_tree_validation() {
        let ok = DependencyTree::new(
            3,
            vec![step(Combine::Complementary, 0, 1), step(Combine::Substitute, 2, 1)],
        )
        .unwrap();
        assert_eq!(ok.root(), 1);

        let consumed = DependencyTree::new(
            3,
            vec![step(Combine::Complementary, 0, 1), step(Combine::Substitute, 0, 2)],
        );
        assert!(matches!(consumed, Err(ValuationError::MalformedDependencyTree(_))));

        let self_merge = DependencyTree::new(2, vec![step(Combine::Multiply, 1, 1)]);
        assert!(self_merge.is_err());

        let out_of_range = DependencyTree::new(2, vec![step(Combine::Multiply, 0, 2)]);
        assert!(out_of_range.is_err());

        let leftover = DependencyTree::new(3, vec![step(Combine::Multiply, 0, 1)]);
        assert!(matches!(leftover, Err(ValuationError::MalformedDependencyTree(_))));
    }

    #[test]
    fn test_tree_reduce_order() {
        // min(a, b) then max with c
        let tree = DependencyTree::new(
            3,
            vec![step(Combine::Complementary, 0, 1), step(Combine::Substitute, 1, 2)],
        )
        .unwrap();
        let slices = [arr1(&[1.0, 3.0]), arr1(&[2.0]), arr1(&[0.0, 2.5])];
        let surface = tree.compose(&slices).unwrap();
        assert_eq!(surface.shape(), &[2, 1, 2]);
        assert_eq!(surface[[0, 0, 0]], 1.0);
        assert_eq!(surface[[1, 0, 0]], 2.0);
        assert_eq!(surface[[1, 0, 1]], 2.5);
    }

    #[test]
    fn test_absent_operands_pass_through() {
        // Built for 4 dimensions, applied to the first 2.
        let tree = DependencyTree::new(
            4,
            vec![
                step(Combine::Multiply, 2, 3),
                step(Combine::Complementary, 0, 3),
                step(Combine::Substitute, 1, 3),
            ],
        )
        .unwrap();
        let a = arr1(&[0.2, 0.8]);
        let b = arr1(&[0.5, 0.6]);

        // Step 1 merges two empty slots; step 2 passes slot 0 through; step 3 takes max.
        let surface = tree.compose(&[a.clone(), b.clone()]).unwrap();
        let expected = compose_elementwise(Combine::Substitute, &[a, b]).unwrap();
        assert_eq!(surface, expected);
    }

    #[test]
    fn test_reduce_rejects_too_many_meshes() {
        let tree = DependencyTree::new(1, vec![]).unwrap();
        let slices = [arr1(&[1.0]), arr1(&[2.0])];
        assert!(matches!(
            tree.compose(&slices),
            Err(ValuationError::DimensionMismatch(_))
        ));
    }

    #[test]
    fn test_random_trees_close_to_single_root() {
        let mut rng = StdRng::seed_from_u64(21);
        for ndim in 1..=8 {
            for family in TREE_FAMILIES {
                let tree = random_tree(&mut rng, ndim, family.weights);
                assert_eq!(tree.steps().len(), ndim - 1);
                let rebuilt = DependencyTree::new(ndim, tree.steps().to_vec()).unwrap();
                assert_eq!(rebuilt.root(), tree.root());
                for s in tree.steps() {
                    assert!(family.weights.iter().any(|(op, _)| *op == s.op));
                }
            }
        }
    }

    #[test]
    fn test_generate_trees_keys() {
        let mut rng = StdRng::seed_from_u64(22);
        let trees = generate_trees(&mut rng, 5, 4);
        let keys: Vec<&str> = trees.keys().map(String::as_str).collect();
        assert_eq!(
            keys,
            vec!["resource_dependency_cs", "resource_dependency_csm", "resource_dependency_sm"]
        );
        assert!(trees.values().all(|ts| ts.len() == 5 && ts.iter().all(|t| t.ndim() == 4)));
    }

    #[test]
    fn test_tree_json_form() {
        let json = r#"[["c", [0, 1]], ["multiply", [2, 1]]]"#;
        let tree: DependencyTree = serde_json::from_str(json).unwrap();
        assert_eq!(tree.ndim(), 3);
        assert_eq!(tree.root(), 1);
        assert_eq!(serde_json::to_string(&tree).unwrap(), r#"[["c",[0,1]],["m",[2,1]]]"#);

        let bad = r#"[["c", [0, 1]], ["s", [0, 2]]]"#;
        let err = serde_json::from_str::<DependencyTree>(bad).unwrap_err();
        assert!(err.to_string().contains("consumed slot 0"));
    }
}
