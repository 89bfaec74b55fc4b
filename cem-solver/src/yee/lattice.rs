use nalgebra::{
    Point3,
    Vector3,
    Vector4,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    pub const ALL: [Self; 3] = [Self::X, Self::Y, Self::Z];

    pub fn vector_index(&self) -> usize {
        match self {
            Axis::X => 0,
            Axis::Y => 1,
            Axis::Z => 2,
        }
    }

    pub fn vector_component<'a, T>(&self, vector: &'a Vector3<T>) -> &'a T {
        &vector[self.vector_index()]
    }

    pub fn basis(&self) -> Vector3<f64> {
        let mut e = Vector3::zeros();
        e[self.vector_index()] = 1.0;
        e
    }

    pub fn unit(&self) -> Vector3<usize> {
        let mut e = Vector3::zeros();
        e[self.vector_index()] = 1;
        e
    }

    /// The next two axes in cyclic order, i.e. `(u, v)` with `u × v = self`.
    pub fn cyclic_complement(&self) -> (Self, Self) {
        match self {
            Axis::X => (Axis::Y, Axis::Z),
            Axis::Y => (Axis::Z, Axis::X),
            Axis::Z => (Axis::X, Axis::Y),
        }
    }
}

/// Maps 3D lattice points to linear indices (x fastest).
#[derive(Clone, Copy, Debug)]
pub struct Strider {
    strides: Vector4<usize>,
    size: Vector3<usize>,
}

impl Strider {
    pub fn new(size: &Vector3<usize>) -> Self {
        Self {
            strides: strides_for_size(size),
            size: *size,
        }
    }

    pub fn point_unchecked(&self, mut index: usize) -> Point3<usize> {
        let z = index / self.strides.z;
        index %= self.strides.z;
        let y = index / self.strides.y;
        index %= self.strides.y;
        let x = index / self.strides.x;
        Point3::new(x, y, z)
    }

    pub fn point(&self, index: usize) -> Option<Point3<usize>> {
        (index < self.strides.w).then(|| self.point_unchecked(index))
    }

    fn index_unchecked(&self, point: &Point3<usize>) -> usize {
        point.coords.dot(&self.strides.xyz())
    }

    pub fn index(&self, point: &Point3<usize>) -> Option<usize> {
        self.is_inside(point).then(|| self.index_unchecked(point))
    }

    pub fn size(&self) -> &Vector3<usize> {
        &self.size
    }

    pub fn len(&self) -> usize {
        self.strides.w
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, Point3<usize>)> + '_ {
        (0..self.len()).map(|index| (index, self.point_unchecked(index)))
    }

    fn is_inside(&self, point: &Point3<usize>) -> bool {
        point.x < self.size.x && point.y < self.size.y && point.z < self.size.z
    }
}

pub fn strides_for_size(size: &Vector3<usize>) -> Vector4<usize> {
    let mut strides = Vector4::zeros();
    strides.x = 1;
    strides.y = strides.x * size.x;
    strides.z = strides.y * size.y;
    strides.w = strides.z * size.z;
    strides
}

/// Degrees of freedom that come in one family per axis, e.g. edges or faces.
///
/// Family `a` has its own [`Strider`]; the families are stored one after the
/// other (all x, then all y, then all z).
#[derive(Clone, Copy, Debug)]
pub struct StaggeredLayout {
    families: [Strider; 3],
    offsets: [usize; 4],
}

impl StaggeredLayout {
    fn new(sizes: [Vector3<usize>; 3]) -> Self {
        let families = sizes.map(|size| Strider::new(&size));
        let mut offsets = [0; 4];
        for (i, family) in families.iter().enumerate() {
            offsets[i + 1] = offsets[i] + family.len();
        }
        Self { families, offsets }
    }

    /// Edges along axis `a`: `cells + 1` points in every direction except `a`.
    pub fn edges(cells: &Vector3<usize>) -> Self {
        Self::new(Axis::ALL.map(|axis| cells + Vector3::repeat(1) - axis.unit()))
    }

    /// Faces with normal `n`: `cells` points in every direction except `n`.
    pub fn faces(cells: &Vector3<usize>) -> Self {
        Self::new(Axis::ALL.map(|axis| cells + axis.unit()))
    }

    pub fn len(&self) -> usize {
        self.offsets[3]
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn family(&self, axis: Axis) -> &Strider {
        &self.families[axis.vector_index()]
    }

    pub fn index(&self, axis: Axis, point: &Point3<usize>) -> Option<usize> {
        let family = axis.vector_index();
        self.families[family]
            .index(point)
            .map(|index| self.offsets[family] + index)
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, Axis, Point3<usize>)> + '_ {
        Axis::ALL.into_iter().flat_map(move |axis| {
            let offset = self.offsets[axis.vector_index()];
            self.family(axis)
                .iter()
                .map(move |(index, point)| (offset + index, axis, point))
        })
    }
}

/// One of the six sides of the simulation box.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "snake_case")
)]
pub enum BoundarySurface {
    XMin,
    XMax,
    YMin,
    YMax,
    ZMin,
    ZMax,
}

impl BoundarySurface {
    pub fn new(axis: Axis, max: bool) -> Self {
        match (axis, max) {
            (Axis::X, false) => Self::XMin,
            (Axis::X, true) => Self::XMax,
            (Axis::Y, false) => Self::YMin,
            (Axis::Y, true) => Self::YMax,
            (Axis::Z, false) => Self::ZMin,
            (Axis::Z, true) => Self::ZMax,
        }
    }
}

/// Uniform rectilinear lattice on a box.
#[derive(Clone, Debug)]
pub struct Lattice {
    cells: Vector3<usize>,
    spacing: Vector3<f64>,
    origin: Point3<f64>,
}

impl Lattice {
    /// `extent` is the size of the whole box.
    pub fn new(cells: Vector3<usize>, extent: Vector3<f64>, origin: Point3<f64>) -> Option<Self> {
        let valid = cells.iter().all(|n| *n > 0)
            && extent.iter().all(|x| x.is_finite() && *x > 0.0)
            && origin.iter().all(|x| x.is_finite());

        valid.then(|| {
            Self {
                cells,
                spacing: extent.component_div(&cells.cast::<f64>()),
                origin,
            }
        })
    }

    pub fn cells(&self) -> &Vector3<usize> {
        &self.cells
    }

    pub fn spacing(&self) -> &Vector3<f64> {
        &self.spacing
    }

    pub fn origin(&self) -> &Point3<f64> {
        &self.origin
    }

    pub fn cell_volume(&self) -> f64 {
        self.spacing.product()
    }

    pub fn edges(&self) -> StaggeredLayout {
        StaggeredLayout::edges(&self.cells)
    }

    pub fn faces(&self) -> StaggeredLayout {
        StaggeredLayout::faces(&self.cells)
    }

    pub fn position(&self, point: &Vector3<f64>) -> Point3<f64> {
        self.origin + point.component_mul(&self.spacing)
    }

    /// Midpoint of the edge along `axis` starting at lattice point `point`.
    pub fn edge_midpoint(&self, axis: Axis, point: &Point3<usize>) -> Point3<f64> {
        self.position(&(point.coords.cast::<f64>() + 0.5 * axis.basis()))
    }

    /// Center of the face with normal `axis` at lattice point `point`.
    pub fn face_center(&self, axis: Axis, point: &Point3<usize>) -> Point3<f64> {
        let offset = Vector3::repeat(0.5) - 0.5 * axis.basis();
        self.position(&(point.coords.cast::<f64>() + offset))
    }

    /// Boundary surfaces an edge lies in.
    pub fn edge_surfaces(
        &self,
        axis: Axis,
        point: &Point3<usize>,
    ) -> impl Iterator<Item = BoundarySurface> + '_ {
        let point = *point;
        Axis::ALL
            .into_iter()
            .filter(move |other| *other != axis)
            .flat_map(move |other| {
                let i = other.vector_index();
                let min = (point[i] == 0).then(|| BoundarySurface::new(other, false));
                let max = (point[i] == self.cells[i]).then(|| BoundarySurface::new(other, true));
                min.into_iter().chain(max)
            })
    }
}

#[cfg(test)]
mod tests {
    use nalgebra::{
        Point3,
        Vector3,
    };

    use crate::yee::lattice::{
        Axis,
        BoundarySurface,
        Lattice,
        StaggeredLayout,
        Strider,
    };

    #[test]
    fn strider_round_trips_points() {
        let strider = Strider::new(&Vector3::new(3, 4, 5));
        assert_eq!(strider.len(), 60);
        for (index, point) in strider.iter() {
            assert_eq!(strider.index(&point), Some(index));
        }
        assert_eq!(strider.index(&Point3::new(3, 0, 0)), None);
        assert_eq!(strider.point(60), None);
    }

    #[test]
    fn edge_and_face_counts() {
        let cells = Vector3::new(2, 3, 4);
        let edges = StaggeredLayout::edges(&cells);
        let faces = StaggeredLayout::faces(&cells);

        assert_eq!(edges.family(Axis::X).len(), 2 * 4 * 5);
        assert_eq!(edges.family(Axis::Y).len(), 3 * 3 * 5);
        assert_eq!(edges.family(Axis::Z).len(), 3 * 4 * 4);
        assert_eq!(edges.len(), 40 + 45 + 48);

        assert_eq!(faces.family(Axis::X).len(), 3 * 3 * 4);
        assert_eq!(faces.family(Axis::Y).len(), 2 * 4 * 4);
        assert_eq!(faces.family(Axis::Z).len(), 2 * 3 * 5);

        let indices = edges.iter().map(|(index, _, _)| index).collect::<Vec<_>>();
        assert_eq!(indices, (0..edges.len()).collect::<Vec<_>>());
    }

    #[test]
    fn staggered_positions() {
        let lattice = Lattice::new(
            Vector3::new(2, 2, 2),
            Vector3::new(1.0, 2.0, 4.0),
            Point3::new(-1.0, 0.0, 0.0),
        )
        .unwrap();
        assert_eq!(lattice.cell_volume(), 0.5 * 1.0 * 2.0);

        assert_eq!(
            lattice.edge_midpoint(Axis::Y, &Point3::new(1, 0, 2)),
            Point3::new(-0.5, 0.5, 4.0)
        );
        assert_eq!(
            lattice.face_center(Axis::Z, &Point3::new(0, 1, 2)),
            Point3::new(-0.75, 1.5, 4.0)
        );
    }

    #[test]
    fn rejects_degenerate_lattices() {
        assert!(Lattice::new(Vector3::new(0, 1, 1), Vector3::repeat(1.0), Point3::origin()).is_none());
        assert!(Lattice::new(Vector3::repeat(1), Vector3::new(1.0, 0.0, 1.0), Point3::origin()).is_none());
    }

    #[test]
    fn boundary_surfaces_of_edges() {
        let lattice = Lattice::new(Vector3::repeat(2), Vector3::repeat(1.0), Point3::origin()).unwrap();

        // interior z edge
        assert_eq!(lattice.edge_surfaces(Axis::Z, &Point3::new(1, 1, 0)).count(), 0);

        // z edge on the x_max/y_min corner line
        let surfaces = lattice
            .edge_surfaces(Axis::Z, &Point3::new(2, 0, 1))
            .collect::<Vec<_>>();
        assert_eq!(surfaces, vec![BoundarySurface::XMax, BoundarySurface::YMin]);

        // an x edge is never on an x surface
        assert_eq!(
            lattice
                .edge_surfaces(Axis::X, &Point3::new(0, 1, 1))
                .count(),
            0
        );
    }
}
