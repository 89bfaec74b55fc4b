//! Staggered lattice discretization
//!
//! A uniform Yee lattice on a box with perfectly conducting walls. The
//! electric field is stored as tangential components on the lattice edges,
//! the magnetic flux density as normal components on the faces. The discrete
//! curl `C` maps edges to faces, and the field equations become
//!
//! ```text
//! dB/dt = -C·E
//! M_ε·dE/dt = Cᵗ·M_ν·B - M_ε·J/ε
//! ```
//!
//! with diagonal (lumped) mass matrices `M_ε` and `M_ν = μ⁻¹`. Edges on the
//! walls are held at zero, unless they are on a driven surface, where their
//! rate is prescribed by a [`BoundaryDrive`].

mod lattice;

use nalgebra::{
    DVector,
    Point3,
    Vector3,
};
use parking_lot::Mutex;

pub use self::lattice::{
    Axis,
    BoundarySurface,
    Lattice,
    StaggeredLayout,
    Strider,
};
use crate::{
    driver::Discretization,
    integrator::FieldSystem,
    linalg::{
        CsrMatrix,
        DiagonalMatrix,
        Invertible,
        LinearOperator,
        Scaled,
        SparseError,
        SparseStorage,
    },
    material::{
        MaterialDistribution,
        PhysicalConstants,
    },
    source::{
        BoundaryDrive,
        CurrentSource,
        SourceError,
        VectorSource,
    },
};

#[derive(Debug, thiserror::Error)]
pub enum YeeError {
    #[error("Invalid lattice: cells = {cells:?}, extent = {extent:?}")]
    InvalidLattice {
        cells: Vector3<usize>,
        extent: Vector3<f64>,
    },

    #[error("The {what} is {dimension}-dimensional, but the lattice is 3-dimensional")]
    Dimension {
        what: &'static str,
        dimension: usize,
    },

    #[error("Lattice has no interior edges")]
    NoInteriorEdges,

    #[error("Sparse matrix assembly failed")]
    Sparse(#[from] SparseError),
}

#[derive(Clone, Debug)]
pub struct YeeConfig {
    pub cells: Vector3<usize>,

    /// Size of the box
    pub extent: Vector3<f64>,

    pub origin: Point3<f64>,

    pub physical_constants: PhysicalConstants,

    /// Surfaces on which the tangential electric field is driven by
    /// [`boundary_drive`][Self::boundary_drive] instead of being held at
    /// zero.
    pub driven_surfaces: Vec<BoundarySurface>,

    pub boundary_drive: Option<BoundaryDrive>,

    /// Maximum number of power iterations used to estimate the stability
    /// bound.
    pub power_iterations: usize,
}

impl Default for YeeConfig {
    fn default() -> Self {
        Self {
            cells: Vector3::repeat(8),
            extent: Vector3::repeat(1.0),
            origin: Point3::origin(),
            physical_constants: PhysicalConstants::SI,
            driven_surfaces: vec![],
            boundary_drive: None,
            power_iterations: 200,
        }
    }
}

/// Initial condition for a field, as a function of position.
pub type VectorField = Box<dyn Fn(&Point3<f64>) -> Vector3<f64> + Send + Sync>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum EdgeConstraint {
    Free,
    Conductor,
    Driven,
}

#[derive(Clone, Copy, Debug)]
struct Edge {
    axis: Axis,
    midpoint: Point3<f64>,
    constraint: EdgeConstraint,
}

#[derive(Clone, Copy, Debug)]
struct Face {
    normal: Axis,
    center: Point3<f64>,
}

#[derive(Debug)]
struct Scratch {
    faces: DVector<f64>,
    edges: DVector<f64>,
}

/// Snapshot of the magnetic field intensity `H = μ⁻¹·B` on the faces.
#[derive(Clone, Debug)]
pub struct MagneticIntensity {
    pub time: f64,
    pub field: DVector<f64>,
}

#[derive(derive_more::Debug)]
pub struct YeeSystem {
    lattice: Lattice,
    physical_constants: PhysicalConstants,

    #[debug(skip)]
    edges: Vec<Edge>,

    #[debug(skip)]
    faces: Vec<Face>,

    #[debug(skip)]
    edge_permittivity: DVector<f64>,

    #[debug(skip)]
    face_inverse_permeability: DVector<f64>,

    #[debug(skip)]
    negative_curl: CsrMatrix,

    #[debug(skip)]
    electric_mass: DiagonalMatrix,

    #[debug(skip)]
    magnetic_mass: DiagonalMatrix,

    current_source: CurrentSource,
    boundary_drive: Option<BoundaryDrive>,
    max_time_step: f64,

    #[debug(skip)]
    initial_electric_field: Option<VectorField>,

    #[debug(skip)]
    initial_magnetic_field: Option<VectorField>,

    #[debug(skip)]
    scratch: Mutex<Scratch>,

    #[debug(skip)]
    magnetic_intensity: Mutex<MagneticIntensity>,
}

impl YeeSystem {
    pub fn new(
        config: &YeeConfig,
        materials: &impl MaterialDistribution,
        current_source: CurrentSource,
    ) -> Result<Self, YeeError> {
        let lattice = Lattice::new(config.cells, config.extent, config.origin).ok_or(
            YeeError::InvalidLattice {
                cells: config.cells,
                extent: config.extent,
            },
        )?;

        if let Some(dimension) = materials.dimension().filter(|dimension| *dimension != 3) {
            return Err(YeeError::Dimension {
                what: "material model",
                dimension,
            });
        }
        if let Some(dimension) = current_source
            .dimensions()
            .find(|dimension| *dimension != 3)
        {
            return Err(YeeError::Dimension {
                what: "current source",
                dimension,
            });
        }

        let physical_constants = config.physical_constants;
        let edge_layout = lattice.edges();
        let face_layout = lattice.faces();
        let volume = lattice.cell_volume();

        let edges = edge_layout
            .iter()
            .map(|(_, axis, point)| {
                let mut constraint = EdgeConstraint::Free;
                for surface in lattice.edge_surfaces(axis, &point) {
                    if config.boundary_drive.is_some() && config.driven_surfaces.contains(&surface)
                    {
                        constraint = EdgeConstraint::Driven;
                        break;
                    }
                    constraint = EdgeConstraint::Conductor;
                }
                Edge {
                    axis,
                    midpoint: lattice.edge_midpoint(axis, &point),
                    constraint,
                }
            })
            .collect::<Vec<_>>();

        if !edges
            .iter()
            .any(|edge| edge.constraint == EdgeConstraint::Free)
        {
            return Err(YeeError::NoInteriorEdges);
        }

        let faces = face_layout
            .iter()
            .map(|(_, normal, point)| {
                Face {
                    normal,
                    center: lattice.face_center(normal, &point),
                }
            })
            .collect::<Vec<_>>();

        let edge_permittivity = DVector::from_iterator(
            edges.len(),
            edges.iter().map(|edge| {
                materials
                    .material(edge.midpoint.coords.as_slice())
                    .permittivity(&physical_constants)
            }),
        );
        let face_inverse_permeability = DVector::from_iterator(
            faces.len(),
            faces.iter().map(|face| {
                1.0 / materials
                    .material(face.center.coords.as_slice())
                    .permeability(&physical_constants)
            }),
        );

        let electric_mass = DiagonalMatrix::new(&edge_permittivity * volume);
        let magnetic_mass = DiagonalMatrix::new(&face_inverse_permeability * volume);
        let negative_curl = assemble_negative_curl(&lattice, &edge_layout, &face_layout)?;

        let mut system = Self {
            scratch: Mutex::new(Scratch {
                faces: DVector::zeros(faces.len()),
                edges: DVector::zeros(edges.len()),
            }),
            magnetic_intensity: Mutex::new(MagneticIntensity {
                time: 0.0,
                field: DVector::zeros(faces.len()),
            }),
            lattice,
            physical_constants,
            edges,
            faces,
            edge_permittivity,
            face_inverse_permeability,
            negative_curl,
            electric_mass,
            magnetic_mass,
            current_source,
            boundary_drive: config.boundary_drive,
            max_time_step: f64::INFINITY,
            initial_electric_field: None,
            initial_magnetic_field: None,
        };

        let max_eigenvalue = system.estimate_max_eigenvalue(config.power_iterations);
        if max_eigenvalue <= 0.0 {
            return Err(YeeError::NoInteriorEdges);
        }
        system.max_time_step = 2.0 / max_eigenvalue.sqrt();

        tracing::debug!(
            cells = ?system.lattice.cells(),
            spacing = ?system.lattice.spacing(),
            electric_dofs = system.edges.len(),
            magnetic_dofs = system.faces.len(),
            nonzeros = system.negative_curl.num_nonzeros(),
            max_time_step = system.max_time_step,
            "assembled yee system"
        );

        Ok(system)
    }

    pub fn with_initial_electric_field(
        mut self,
        field: impl Fn(&Point3<f64>) -> Vector3<f64> + Send + Sync + 'static,
    ) -> Self {
        self.initial_electric_field = Some(Box::new(field));
        self
    }

    pub fn with_initial_magnetic_field(
        mut self,
        field: impl Fn(&Point3<f64>) -> Vector3<f64> + Send + Sync + 'static,
    ) -> Self {
        self.initial_magnetic_field = Some(Box::new(field));
        self
    }

    pub fn lattice(&self) -> &Lattice {
        &self.lattice
    }

    pub fn negative_curl(&self) -> &CsrMatrix {
        &self.negative_curl
    }

    /// Latest `H = μ⁻¹·B`, as of the last full step.
    pub fn magnetic_intensity(&self) -> MagneticIntensity {
        self.magnetic_intensity.lock().clone()
    }

    /// Projects a vector field onto the edges (tangential components at the
    /// edge midpoints). Edges on conducting walls are zero.
    pub fn project_electric(&self, field: impl Fn(&Point3<f64>) -> Vector3<f64>) -> DVector<f64> {
        DVector::from_iterator(
            self.edges.len(),
            self.edges.iter().map(|edge| {
                if edge.constraint == EdgeConstraint::Conductor {
                    0.0
                }
                else {
                    *edge.axis.vector_component(&field(&edge.midpoint))
                }
            }),
        )
    }

    /// Projects a vector field onto the faces (normal components at the face
    /// centers).
    pub fn project_magnetic(&self, field: impl Fn(&Point3<f64>) -> Vector3<f64>) -> DVector<f64> {
        DVector::from_iterator(
            self.faces.len(),
            self.faces
                .iter()
                .map(|face| *face.normal.vector_component(&field(&face.center))),
        )
    }

    /// Largest eigenvalue of `M_ε⁻¹·Cᵗ·M_ν·C` restricted to the free edges.
    ///
    /// The Rayleigh quotient approaches the eigenvalue from below.
    fn estimate_max_eigenvalue(&self, max_iterations: usize) -> f64 {
        let is_free = |i: usize| self.edges[i].constraint == EdgeConstraint::Free;

        // deterministic, but not aligned with any lattice mode
        let mut x = DVector::from_fn(self.edges.len(), |i, _| {
            if is_free(i) {
                ((i as f64 + 1.0) * 0.618_033_988_749_895).fract() - 0.5
            }
            else {
                0.0
            }
        });
        let mut flux = DVector::zeros(self.faces.len());
        let mut weighted_flux = DVector::zeros(self.faces.len());
        let mut circulation = DVector::zeros(self.edges.len());

        let mut eigenvalue = 0.0;
        for _ in 0..max_iterations {
            let norm = self.electric_mass.quadratic_form(&x).sqrt();
            if norm == 0.0 {
                return 0.0;
            }
            x /= norm;

            self.negative_curl.apply(&x, &mut flux);
            self.magnetic_mass.apply(&flux, &mut weighted_flux);
            let next = flux.dot(&weighted_flux);

            self.negative_curl
                .apply_transpose(&weighted_flux, &mut circulation);
            self.electric_mass.inverse().apply(&circulation, &mut x);
            for (i, x) in x.iter_mut().enumerate() {
                if !is_free(i) {
                    *x = 0.0;
                }
            }

            let converged = (next - eigenvalue).abs() <= 1e-10 * next;
            eigenvalue = next;
            if converged {
                break;
            }
        }

        eigenvalue
    }
}

/// Assembles `-C`, where `C` is the discrete curl from edges to faces:
///
/// `(C·E)_n(p) = (E_v(p + e_u) - E_v(p)) / du - (E_u(p + e_v) - E_u(p)) / dv`
///
/// with `(u, v, n)` cyclic.
fn assemble_negative_curl(
    lattice: &Lattice,
    edges: &StaggeredLayout,
    faces: &StaggeredLayout,
) -> Result<CsrMatrix, SparseError> {
    let spacing = lattice.spacing();
    let mut matrix = CsrMatrix::new(faces.len(), edges.len());

    for (row, normal, point) in faces.iter() {
        let (u, v) = normal.cyclic_complement();
        let du = *u.vector_component(spacing);
        let dv = *v.vector_component(spacing);

        for (axis, offset, coefficient) in [
            (v, u.unit(), 1.0 / du),
            (v, Vector3::zeros(), -1.0 / du),
            (u, v.unit(), -1.0 / dv),
            (u, Vector3::zeros(), 1.0 / dv),
        ] {
            let column = edges.index(axis, &(point + offset)).ok_or(
                SparseError::OutOfBounds {
                    row,
                    column: edges.len(),
                    nrows: faces.len(),
                    ncols: edges.len(),
                },
            )?;
            matrix.add(row, column, -coefficient)?;
        }
    }

    matrix.finalize();
    Ok(matrix)
}

impl FieldSystem for YeeSystem {
    fn electric_dofs(&self) -> usize {
        self.edges.len()
    }

    fn magnetic_dofs(&self) -> usize {
        self.faces.len()
    }

    fn electric_rate(
        &self,
        b: &DVector<f64>,
        time: f64,
        de: &mut DVector<f64>,
    ) -> Result<(), SourceError> {
        let mut scratch = self.scratch.lock();
        let Scratch { faces, edges } = &mut *scratch;

        // -Pᵗ·M_ν·B = Cᵗ·M_ν·B
        self.magnetic_mass.apply(b, faces);
        self.negative_curl.apply_transpose(faces, edges);
        Scaled::new(self.electric_mass.inverse(), -1.0).apply(edges, de);

        let has_sources = self.current_source.is_active();

        for (i, edge) in self.edges.iter().enumerate() {
            match edge.constraint {
                EdgeConstraint::Free => {
                    if has_sources {
                        let current_density = self.current_source.evaluate_at(&edge.midpoint, time)?;
                        de[i] -= edge.axis.vector_component(&current_density)
                            / self.edge_permittivity[i];
                    }
                }
                EdgeConstraint::Conductor => de[i] = 0.0,
                EdgeConstraint::Driven => {
                    de[i] = self.boundary_drive.map_or(0.0, |drive| {
                        *edge.axis.vector_component(&drive.electric_field_rate(
                            &edge.midpoint,
                            time,
                            &self.physical_constants,
                        ))
                    });
                }
            }
        }

        Ok(())
    }

    fn synchronize(&self, b: &DVector<f64>, _e: &DVector<f64>, time: f64) {
        let mut magnetic_intensity = self.magnetic_intensity.lock();
        magnetic_intensity.time = time;
        magnetic_intensity.field.copy_from(b);
        magnetic_intensity
            .field
            .component_mul_assign(&self.face_inverse_permeability);
    }
}

impl Discretization for YeeSystem {
    type Coupling = CsrMatrix;

    fn coupling(&self) -> &CsrMatrix {
        &self.negative_curl
    }

    fn maximum_time_step(&self) -> f64 {
        self.max_time_step
    }

    fn energy(&self, b: &DVector<f64>, e: &DVector<f64>) -> f64 {
        0.5 * (self.electric_mass.quadratic_form(e) + self.magnetic_mass.quadratic_form(b))
    }

    fn initial_fields(&self) -> (DVector<f64>, DVector<f64>) {
        let b = self
            .initial_magnetic_field
            .as_ref()
            .map_or_else(|| DVector::zeros(self.faces.len()), |field| {
                self.project_magnetic(field)
            });
        let e = self
            .initial_electric_field
            .as_ref()
            .map_or_else(|| DVector::zeros(self.edges.len()), |field| {
                self.project_electric(field)
            });
        (b, e)
    }

    fn memory_required(&self) -> usize {
        let float = size_of::<f64>();
        let index = size_of::<usize>();
        let num_edges = self.edges.len();
        let num_faces = self.faces.len();

        self.negative_curl.num_nonzeros() * (float + index)
            + (num_faces + 1) * index
            + num_edges * (size_of::<Edge>() + 3 * float)
            + num_faces * (size_of::<Face>() + 4 * float)
    }
}
