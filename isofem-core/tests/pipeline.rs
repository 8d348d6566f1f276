//! Formulation engine feeding the equation solvers, the way an assembly layer
//! drives them during one analysis step.

use approx::assert_relative_eq;
use isofem_core::element::lagrange::{LagrangeFamily, LagrangeFormulation, ShapeFunctionRegistry};
use isofem_core::solver::{select_solver, SolverConfig, SolverKind};
use isofem_core::sparse::{relative_residual, CsrMatrix, TripletMatrix};
use isofem_core::Point3;
use nalgebra::DMatrix;

fn init_logger() {
    let _ = env_logger::Builder::from_env("ISOFEM_LOG")
        .is_test(true)
        .try_init();
}

/// Element stiffness `∫ Bᵀ B dV` of a scalar field.
fn element_stiffness(formulation: &LagrangeFormulation) -> DMatrix<f64> {
    let n = formulation.family().n_nodes();
    let mut ke = DMatrix::zeros(n, n);
    for p in 0..formulation.n_points() {
        let b = formulation.derivatives(p);
        ke += b.transpose() * b * formulation.weight(p);
    }
    ke
}

/// Consistent mass `∫ N Nᵀ dV`.
fn element_mass(formulation: &LagrangeFormulation) -> DMatrix<f64> {
    let n = formulation.family().n_nodes();
    let mut me = DMatrix::zeros(n, n);
    for p in 0..formulation.n_points() {
        let values = formulation.shape_values(p);
        me += values * values.transpose() * formulation.weight(p);
    }
    me
}

/// Axial bar of `n_elements` equal elements, fixed at x = 0. Node 0 is
/// eliminated, so global equation `i` belongs to node `i + 1`.
fn bar_system(
    registry: &mut ShapeFunctionRegistry,
    n_elements: usize,
    length: f64,
    stiffness_scale: f64,
) -> CsrMatrix {
    let h = length / n_elements as f64;
    let mut formulation = LagrangeFormulation::new(LagrangeFamily::BAR2);
    let mut triplet = TripletMatrix::new(n_elements, n_elements);

    for e in 0..n_elements {
        let nodes = [
            Point3::new(e as f64 * h, 0.0, 0.0),
            Point3::new((e + 1) as f64 * h, 0.0, 0.0),
        ];
        let used = formulation.compute_geometry(registry, e, &nodes, 2).unwrap();
        assert_eq!(used, 2);
        let ke = element_stiffness(&formulation) * stiffness_scale;

        let global = [e as isize - 1, e as isize];
        for a in 0..2 {
            for b in 0..2 {
                if global[a] >= 0 && global[b] >= 0 {
                    triplet.add(global[a] as usize, global[b] as usize, ke[(a, b)]);
                }
            }
        }
    }
    triplet.to_csr().unwrap()
}

#[test]
fn bar_tip_load_matches_closed_form() {
    init_logger();
    let n_elements = 16;
    let length = 2.0;
    let force = 3.0;

    for kind in SolverKind::available() {
        let mut registry = ShapeFunctionRegistry::new();
        let matrix = bar_system(&mut registry, n_elements, length, 1.0);
        assert_eq!(registry.tables_built(), 1);

        let mut rhs = vec![0.0; n_elements];
        rhs[n_elements - 1] = force;

        let config = SolverConfig {
            kind,
            ..SolverConfig::default()
        };
        let mut solver = select_solver(&config).unwrap();
        let u = solver.solve(&matrix, &rhs);

        // u(x) = F x / EA with EA = 1
        let h = length / n_elements as f64;
        for (i, ui) in u.iter().enumerate() {
            assert_relative_eq!(*ui, force * (i + 1) as f64 * h, epsilon = 1e-10);
        }
    }
}

#[test]
fn repeated_steps_reuse_one_solver() {
    init_logger();
    let mut registry = ShapeFunctionRegistry::new();
    for kind in SolverKind::available() {
        let config = SolverConfig {
            kind,
            ..SolverConfig::default()
        };
        let mut solver = select_solver(&config).unwrap();

        for step in 1..=4 {
            let scale = step as f64;
            let matrix = bar_system(&mut registry, 10, 1.0, scale);
            let rhs: Vec<f64> = (0..10).map(|i| 0.1 * (i + 1) as f64).collect();
            let u = solver.solve(&matrix, &rhs);
            assert!(relative_residual(&matrix, &u, &rhs, true) < 1e-12);
            assert_eq!(solver.n_equations(), 10);
        }
    }
    assert_eq!(registry.tables_built(), 1);
}

#[test]
fn quad_strip_strategies_agree() {
    init_logger();
    // Unit-height strip of quads along x; column i holds nodes 2i (bottom) and
    // 2i + 1 (top). Column 0 is fixed, so node k maps to equation k - 2.
    let n_elements = 6;
    let h = 0.5;
    let flux = 2.0;
    let n_equations = 2 * n_elements;

    let mut registry = ShapeFunctionRegistry::new();
    let mut quad = LagrangeFormulation::new(LagrangeFamily::QUAD4);
    let mut triplet = TripletMatrix::new(n_equations, n_equations);

    for e in 0..n_elements {
        let x0 = e as f64 * h;
        let x1 = x0 + h;
        let nodes = [
            Point3::new(x0, 0.0, 0.0),
            Point3::new(x1, 0.0, 0.0),
            Point3::new(x1, 1.0, 0.0),
            Point3::new(x0, 1.0, 0.0),
        ];
        let global = [2 * e, 2 * (e + 1), 2 * (e + 1) + 1, 2 * e + 1];

        assert_eq!(quad.compute_geometry(&mut registry, e, &nodes, 4).unwrap(), 4);
        assert!(!quad.is_degenerate());
        assert_relative_eq!(quad.volume(), h, epsilon = 1e-14);
        let ke = element_stiffness(&quad);

        for a in 0..4 {
            for b in 0..4 {
                if global[a] >= 2 && global[b] >= 2 {
                    triplet.add(global[a] - 2, global[b] - 2, ke[(a, b)]);
                }
            }
        }
    }
    let matrix = triplet.to_csr().unwrap();

    let mut rhs = vec![0.0; n_equations];
    rhs[n_equations - 2] = flux / 2.0;
    rhs[n_equations - 1] = flux / 2.0;

    let mut solutions = Vec::new();
    for kind in SolverKind::available() {
        let config = SolverConfig {
            kind,
            ..SolverConfig::default()
        };
        let mut solver = select_solver(&config).unwrap();
        solutions.push(solver.solve(&matrix, &rhs));
    }

    // Linear field T(x) = flux * x, reproduced exactly by bilinear quads.
    for (k, t) in solutions[0].iter().enumerate() {
        let column = k / 2 + 1;
        assert_relative_eq!(*t, flux * column as f64 * h, epsilon = 1e-10);
    }
    for other in &solutions[1..] {
        for (a, b) in other.iter().zip(&solutions[0]) {
            assert_relative_eq!(*a, *b, epsilon = 1e-10);
        }
    }
}

#[test]
fn hex_mass_matrix_system() {
    init_logger();
    let mut registry = ShapeFunctionRegistry::new();
    let mut nodes: Vec<Point3> = (0..8)
        .map(|k| {
            let xi = LagrangeFamily::HEX8.node_coords(k);
            Point3::new(0.5 * (xi[0] + 1.0), 0.5 * (xi[1] + 1.0), 0.5 * (xi[2] + 1.0))
        })
        .collect();
    nodes[6] += Point3::new(0.25, 0.25, 0.25);

    let mut hex = LagrangeFormulation::new(LagrangeFamily::HEX8);
    hex.compute_geometry(&mut registry, 0, &nodes, 27).unwrap();
    let me = element_mass(&hex);

    // Entries of the consistent mass sum to the volume.
    assert_relative_eq!(me.sum(), hex.volume(), epsilon = 1e-12);

    let mut triplet = TripletMatrix::new(8, 8);
    let all: Vec<usize> = (0..8).collect();
    triplet.add_submatrix(&all, &me);
    let matrix = triplet.to_csr().unwrap();

    // M · 1 is the row sum, so the solution is all ones.
    let rhs: Vec<f64> = (0..8).map(|i| me.row(i).sum()).collect();
    for kind in SolverKind::available() {
        let config = SolverConfig {
            kind,
            ..SolverConfig::default()
        };
        let mut solver = select_solver(&config).unwrap();
        let x = solver.try_solve(&matrix, &rhs).unwrap();
        for xi in x {
            assert_relative_eq!(xi, 1.0, epsilon = 1e-9);
        }
    }
}

#[test]
fn unconstrained_bar_is_fatal() {
    // Without the support the stiffness matrix is singular.
    let mut registry = ShapeFunctionRegistry::new();
    let mut formulation = LagrangeFormulation::new(LagrangeFamily::BAR2);
    let nodes = [Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 0.0, 0.0)];
    formulation.compute_geometry(&mut registry, 0, &nodes, 2).unwrap();

    let mut triplet = TripletMatrix::new(2, 2);
    triplet.add_submatrix(&[0, 1], &element_stiffness(&formulation));
    let matrix = triplet.to_csr().unwrap();

    let result = std::panic::catch_unwind(move || {
        let mut solver = select_solver(&SolverConfig::default()).unwrap();
        solver.solve(&matrix, &[1.0, -1.0])
    });
    assert!(result.is_err());
}
