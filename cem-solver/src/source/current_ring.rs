use nalgebra::{
    Point3,
    Vector3,
};

use crate::source::{
    AxialCoordinates,
    Sinusoid,
    SourceError,
    TimeProfile,
    VectorSource,
    check_dimension,
    infer_dimension,
    pad_point,
};

/// An annulus carrying an azimuthal current.
///
/// Only defined in 3D. The radii may be given in any order.
///
/// Parameters: `[axis_start(3), axis_end(3), radius_a, radius_b, current,
/// frequency]`
#[derive(Clone, Debug)]
pub struct CurrentRing {
    axis_start: Point3<f64>,
    axis_end: Point3<f64>,
    inner_radius: f64,
    outer_radius: f64,
    current: f64,
    modulation: Sinusoid,
}

impl CurrentRing {
    pub fn from_params(params: &[f64]) -> Result<Self, SourceError> {
        let dimension = infer_dimension("current ring", params, 2, 4, "2d + 4")?;
        if dimension != 3 {
            return Err(SourceError::RequiresThreeDimensions { dimension });
        }

        let mut inner_radius = params[6];
        let mut outer_radius = params[7];
        if inner_radius > outer_radius {
            std::mem::swap(&mut inner_radius, &mut outer_radius);
        }

        Ok(Self {
            axis_start: Point3::new(params[0], params[1], params[2]),
            axis_end: Point3::new(params[3], params[4], params[5]),
            inner_radius,
            outer_radius,
            current: params[8],
            modulation: Sinusoid {
                frequency: params[9],
            },
        })
    }

    pub fn radii(&self) -> (f64, f64) {
        (self.inner_radius, self.outer_radius)
    }

    fn current_density(&self, point: &Point3<f64>, time: f64) -> Vector3<f64> {
        let axis = self.axis_end - self.axis_start;
        let height = axis.norm();
        let width = self.outer_radius - self.inner_radius;
        if height == 0.0 || width == 0.0 {
            return Vector3::zeros();
        }

        let coordinates = AxialCoordinates::new(&self.axis_start, &axis, point);
        let distance = coordinates.distance_from_axis();

        if coordinates.is_between_end_points(&axis)
            && distance >= self.inner_radius
            && distance <= self.outer_radius
        {
            let azimuthal = axis.cross(&coordinates.perpendicular) / height;
            azimuthal * (self.current / (height * width) * self.modulation.evaluate(time))
        }
        else {
            Vector3::zeros()
        }
    }
}

impl VectorSource for CurrentRing {
    fn evaluate(&self, point: &[f64], time: f64, out: &mut [f64]) -> Result<(), SourceError> {
        if point.len() != 3 {
            return Err(SourceError::RequiresThreeDimensions {
                dimension: point.len(),
            });
        }
        check_dimension("current ring", 3, point, out)?;

        let value = self.current_density(&pad_point(point), time);
        out.copy_from_slice(value.as_slice());
        Ok(())
    }

    fn evaluate_at(&self, point: &Point3<f64>, time: f64) -> Result<Vector3<f64>, SourceError> {
        Ok(self.current_density(point, time))
    }
}
