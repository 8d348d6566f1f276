//! Isoparametric formulation for the linear Lagrange family.
//!
//! One engine covers the line (2 nodes), quadrilateral (4 nodes) and
//! hexahedron (8 nodes): a family is identified by its spatial dimension and
//! node count instead of a dedicated element type.
//!
//! # Shape Functions
//!
//! For node `k` with natural-coordinate signs `s_k ∈ {-1, +1}^dim`:
//! ```text
//! N_k(ξ) = (1/n) Π_{d<dim} (1 + s_kd ξ_d)
//! ```
//!
//! # Node Numbering
//!
//! Leading nodes of the hexahedron ordering; the quadrilateral uses nodes 0-3
//! and the line nodes 0-1:
//! ```text
//!        7-------6
//!       /|      /|
//!      / |     / |
//!     4-------5  |
//!     |  3----|--2
//!     | /     | /
//!     |/      |/
//!     0-------1
//! ```
//!
//! # Caching
//!
//! Shape-function values and their natural derivatives depend only on the
//! family and the quadrature rule, so they live in a [`ShapeFunctionRegistry`]
//! and are built once per `(family, points per axis)`. Everything that depends
//! on node positions (Jacobians, determinants, physical derivatives) is
//! recomputed by every [`LagrangeFormulation::compute_geometry`] call.

use crate::element::gauss::{gauss_tensor, point_indices, GaussPoint};
use crate::error::{Error, Result};
use crate::types::Point3;
use nalgebra::{DMatrix, DVector};
use std::collections::HashMap;
use std::sync::Arc;

/// Determinant below which an integration point is reported degenerate.
pub const DEGENERATE_DETERMINANT: f64 = 1e-20;

/// Largest number of Gauss points per axis used by the formulation.
pub const MAX_POINTS_PER_AXIS: usize = 3;

/// Natural coordinates of the hexahedron nodes.
const NODE_SIGNS: [[f64; 3]; 8] = [
    [-1.0, -1.0, -1.0],
    [1.0, -1.0, -1.0],
    [1.0, 1.0, -1.0],
    [-1.0, 1.0, -1.0],
    [-1.0, -1.0, 1.0],
    [1.0, -1.0, 1.0],
    [1.0, 1.0, 1.0],
    [-1.0, 1.0, 1.0],
];

/// Element family: spatial dimension and node count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LagrangeFamily {
    dim: usize,
    n_nodes: usize,
}

impl LagrangeFamily {
    /// 2-node line.
    pub const BAR2: LagrangeFamily = LagrangeFamily { dim: 1, n_nodes: 2 };
    /// 4-node quadrilateral.
    pub const QUAD4: LagrangeFamily = LagrangeFamily { dim: 2, n_nodes: 4 };
    /// 8-node hexahedron.
    pub const HEX8: LagrangeFamily = LagrangeFamily { dim: 3, n_nodes: 8 };

    /// Validate a `(dim, n_nodes)` pair.
    ///
    /// Supported families have `dim` in 1..=3 and `2^dim` nodes.
    pub fn new(dim: usize, n_nodes: usize) -> Result<Self> {
        if !(1..=3).contains(&dim) {
            return Err(Error::Element(format!(
                "Lagrange family dimension must be 1, 2 or 3, got {}",
                dim
            )));
        }
        if n_nodes != 1 << dim {
            return Err(Error::Element(format!(
                "linear Lagrange family of dimension {} has {} nodes, got {}",
                dim,
                1 << dim,
                n_nodes
            )));
        }
        Ok(Self { dim, n_nodes })
    }

    /// Spatial dimension.
    pub fn dim(self) -> usize {
        self.dim
    }

    /// Number of nodes.
    pub fn n_nodes(self) -> usize {
        self.n_nodes
    }

    /// Natural coordinates of `node`; axes beyond `dim` are 0.
    pub fn node_coords(self, node: usize) -> [f64; 3] {
        let mut coords = [0.0; 3];
        coords[..self.dim].copy_from_slice(&NODE_SIGNS[node][..self.dim]);
        coords
    }

    /// Points per axis for a requested total point count.
    ///
    /// Largest `k` with `k^dim <= requested`, clamped to `1..=MAX_POINTS_PER_AXIS`.
    pub fn points_per_axis(self, requested: usize) -> usize {
        let mut k = 1;
        while k < MAX_POINTS_PER_AXIS && (k + 1).pow(self.dim as u32) <= requested {
            k += 1;
        }
        k
    }

    fn shape_product(self, node: usize, xi: &[f64; 3]) -> f64 {
        let signs = &NODE_SIGNS[node];
        let product: f64 = (0..self.dim).map(|d| 1.0 + signs[d] * xi[d]).product();
        product / self.n_nodes as f64
    }
}

/// Shape-function values at natural coordinates `xi`.
pub fn shape_functions(family: LagrangeFamily, xi: &[f64; 3]) -> DVector<f64> {
    DVector::from_fn(family.n_nodes, |k, _| family.shape_product(k, xi))
}

/// Shape-function derivatives with respect to natural coordinates.
///
/// Returns a `dim × n_nodes` matrix with `(d, k) = ∂N_k/∂ξ_d`. Each row is
/// the product form with axis `d` frozen at 0, scaled by the node sign on `d`.
pub fn local_shape_derivatives(family: LagrangeFamily, xi: &[f64; 3]) -> DMatrix<f64> {
    let mut dn = DMatrix::zeros(family.dim, family.n_nodes);
    for d in 0..family.dim {
        let mut frozen = *xi;
        frozen[d] = 0.0;
        for k in 0..family.n_nodes {
            dn[(d, k)] = NODE_SIGNS[k][d] * family.shape_product(k, &frozen);
        }
    }
    dn
}

/// Geometry-independent data for one family and quadrature rule.
#[derive(Debug, Clone)]
pub struct ShapeTable {
    family: LagrangeFamily,
    points_per_axis: usize,
    points: Vec<GaussPoint>,
    values: Vec<DVector<f64>>,
    local_derivatives: Vec<DMatrix<f64>>,
}

impl ShapeTable {
    fn build(family: LagrangeFamily, points_per_axis: usize) -> Self {
        let points = gauss_tensor(family.dim, points_per_axis);
        let values = points
            .iter()
            .map(|gp| shape_functions(family, &gp.coords))
            .collect();
        let local_derivatives = points
            .iter()
            .map(|gp| local_shape_derivatives(family, &gp.coords))
            .collect();
        Self {
            family,
            points_per_axis,
            points,
            values,
            local_derivatives,
        }
    }

    /// Family this table was built for.
    pub fn family(&self) -> LagrangeFamily {
        self.family
    }

    /// Gauss points per axis.
    pub fn points_per_axis(&self) -> usize {
        self.points_per_axis
    }

    /// Integration points, axis 0 varying fastest.
    pub fn points(&self) -> &[GaussPoint] {
        &self.points
    }

    /// Shape-function values at integration point `point`.
    pub fn values(&self, point: usize) -> &DVector<f64> {
        &self.values[point]
    }

    /// Natural derivatives at integration point `point`.
    pub fn local_derivatives(&self, point: usize) -> &DMatrix<f64> {
        &self.local_derivatives[point]
    }
}

/// Shared shape-function tables, keyed by family and points per axis.
///
/// Owned by the analysis and handed to every formulation that needs a table.
#[derive(Debug, Default)]
pub struct ShapeFunctionRegistry {
    tables: HashMap<(LagrangeFamily, usize), Arc<ShapeTable>>,
    built: usize,
}

impl ShapeFunctionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Table for `family` with `points_per_axis` Gauss points per axis, built
    /// on first request.
    pub fn table(&mut self, family: LagrangeFamily, points_per_axis: usize) -> Arc<ShapeTable> {
        if let Some(table) = self.tables.get(&(family, points_per_axis)) {
            return Arc::clone(table);
        }

        log::debug!(
            "building shape table for dim {} with {} nodes, {} points per axis",
            family.dim,
            family.n_nodes,
            points_per_axis
        );
        let table = Arc::new(ShapeTable::build(family, points_per_axis));
        self.tables
            .insert((family, points_per_axis), Arc::clone(&table));
        self.built += 1;
        table
    }

    /// Number of tables constructed so far.
    pub fn tables_built(&self) -> usize {
        self.built
    }
}

/// Inverse Jacobian. A singular Jacobian yields NaN entries so the caller can
/// carry on with the invalid point.
fn inverse_jacobian(jacobian: &DMatrix<f64>) -> DMatrix<f64> {
    let dim = jacobian.nrows();
    jacobian
        .clone()
        .try_inverse()
        .unwrap_or_else(|| DMatrix::from_element(dim, dim, f64::NAN))
}

/// Per-element isoparametric geometry at every integration point.
///
/// A single instance is reused element after element; each
/// [`compute_geometry`](Self::compute_geometry) call overwrites the previous
/// element's state. Per-point accessors panic for out-of-range point indices,
/// which is every index before the first computation.
#[derive(Debug, Clone)]
pub struct LagrangeFormulation {
    family: LagrangeFamily,
    element_id: usize,
    table: Option<Arc<ShapeTable>>,
    jacobians: Vec<DMatrix<f64>>,
    inverse_jacobians: Vec<DMatrix<f64>>,
    determinants: Vec<f64>,
    derivatives: Vec<DMatrix<f64>>,
    degenerate: Vec<usize>,
}

impl LagrangeFormulation {
    /// Create an empty formulation for `family`.
    pub fn new(family: LagrangeFamily) -> Self {
        Self {
            family,
            element_id: 0,
            table: None,
            jacobians: Vec::new(),
            inverse_jacobians: Vec::new(),
            determinants: Vec::new(),
            derivatives: Vec::new(),
            degenerate: Vec::new(),
        }
    }

    /// Compute Jacobians, determinants and physical derivatives for one element.
    ///
    /// # Arguments
    ///
    /// * `registry` - Shared shape-function tables
    /// * `element_id` - Element number, used in diagnostics
    /// * `nodes` - Node positions in family node order
    /// * `requested_points` - Desired total number of integration points
    ///
    /// # Returns
    ///
    /// Number of integration points actually used (`points_per_axis^dim`).
    ///
    /// A determinant below [`DEGENERATE_DETERMINANT`] is logged and recorded in
    /// [`degenerate_points`](Self::degenerate_points) without failing the call.
    pub fn compute_geometry(
        &mut self,
        registry: &mut ShapeFunctionRegistry,
        element_id: usize,
        nodes: &[Point3],
        requested_points: usize,
    ) -> Result<usize> {
        let family = self.family;
        if nodes.len() != family.n_nodes {
            return Err(Error::Element(format!(
                "element {} has {} nodes, family expects {}",
                element_id,
                nodes.len(),
                family.n_nodes
            )));
        }

        let table = registry.table(family, family.points_per_axis(requested_points));
        let n_points = table.points.len();

        let coords = DMatrix::from_fn(family.n_nodes, family.dim, |k, j| nodes[k][j]);

        self.element_id = element_id;
        self.jacobians.clear();
        self.inverse_jacobians.clear();
        self.determinants.clear();
        self.derivatives.clear();
        self.degenerate.clear();

        for point in 0..n_points {
            let dn = table.local_derivatives(point);
            let jacobian = dn * &coords;
            let det = jacobian.determinant();

            if det < DEGENERATE_DETERMINANT {
                log::error!(
                    "determinant is too small ({:e}) in element {} at integration point {}",
                    det,
                    element_id,
                    point
                );
                self.degenerate.push(point);
            }

            let inverse = inverse_jacobian(&jacobian);
            self.derivatives.push(&inverse * dn);
            self.jacobians.push(jacobian);
            self.inverse_jacobians.push(inverse);
            self.determinants.push(det);
        }

        self.table = Some(table);
        Ok(n_points)
    }

    fn table(&self) -> &ShapeTable {
        self.table
            .as_deref()
            .unwrap_or_else(|| panic!("geometry not computed for {:?}", self.family))
    }

    /// Element family.
    pub fn family(&self) -> LagrangeFamily {
        self.family
    }

    /// Element id of the last computation.
    pub fn element_id(&self) -> usize {
        self.element_id
    }

    /// Number of integration points of the last computation (0 before any).
    pub fn n_points(&self) -> usize {
        self.determinants.len()
    }

    /// Gauss points per axis of the last computation.
    pub fn points_per_axis(&self) -> usize {
        self.table.as_ref().map_or(0, |table| table.points_per_axis)
    }

    /// Per-axis Gauss indices of `point`.
    ///
    /// # Panics
    ///
    /// Panics if no geometry has been computed yet.
    pub fn point_indices(&self, point: usize) -> [usize; 3] {
        point_indices(point, self.family.dim, self.table().points_per_axis)
    }

    /// Natural coordinates of `point`.
    pub fn local_coords(&self, point: usize) -> [f64; 3] {
        self.table().points[point].coords
    }

    /// Shape-function values at `point`.
    pub fn shape_values(&self, point: usize) -> &DVector<f64> {
        self.table().values(point)
    }

    /// Natural derivatives `∂N/∂ξ` at `point` (`dim × n_nodes`).
    pub fn local_derivatives(&self, point: usize) -> &DMatrix<f64> {
        self.table().local_derivatives(point)
    }

    /// Physical derivatives `∂N/∂x = J⁻¹ ∂N/∂ξ` at `point` (`dim × n_nodes`).
    pub fn derivatives(&self, point: usize) -> &DMatrix<f64> {
        &self.derivatives[point]
    }

    /// Jacobian `J = ∂x/∂ξ` at `point` (`dim × dim`, row = natural axis).
    pub fn jacobian(&self, point: usize) -> &DMatrix<f64> {
        &self.jacobians[point]
    }

    /// Inverse Jacobian at `point`.
    pub fn inverse_jacobian(&self, point: usize) -> &DMatrix<f64> {
        &self.inverse_jacobians[point]
    }

    /// Jacobian determinant at `point`.
    pub fn determinant(&self, point: usize) -> f64 {
        self.determinants[point]
    }

    /// Quadrature weight at `point`: determinant times the Gauss weights.
    pub fn weight(&self, point: usize) -> f64 {
        self.determinants[point] * self.table().points[point].weight
    }

    /// Element length, area or volume: the sum of the quadrature weights.
    pub fn volume(&self) -> f64 {
        (0..self.n_points()).map(|p| self.weight(p)).sum()
    }

    /// Integration points whose determinant fell below [`DEGENERATE_DETERMINANT`].
    pub fn degenerate_points(&self) -> &[usize] {
        &self.degenerate
    }

    /// Whether the last element had any degenerate integration point.
    pub fn is_degenerate(&self) -> bool {
        !self.degenerate.is_empty()
    }

    /// Interpolate nodal values at `point`: `Σ N_k u_k`.
    pub fn interpolate(&self, point: usize, nodal_values: &[f64]) -> f64 {
        debug_assert_eq!(nodal_values.len(), self.family.n_nodes);
        self.shape_values(point)
            .iter()
            .zip(nodal_values)
            .map(|(n, u)| n * u)
            .sum()
    }
}
