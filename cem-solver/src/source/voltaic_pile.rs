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

/// A cylindrical rod polarized along its axis.
///
/// Inside the cylinder the polarization points along the axis with strength
/// `magnitude / |axis|`. Outside it is zero.
///
/// Parameters: `[axis_start.., axis_end.., radius, magnitude, frequency]`
#[derive(Clone, Debug)]
pub struct VoltaicPile {
    dimension: usize,
    axis_start: Point3<f64>,
    axis_end: Point3<f64>,
    radius: f64,
    magnitude: f64,
    modulation: Sinusoid,
}

impl VoltaicPile {
    pub fn from_params(params: &[f64]) -> Result<Self, SourceError> {
        let dimension = infer_dimension("voltaic pile", params, 2, 3, "2d + 3")?;
        let scalars = &params[2 * dimension..];

        Ok(Self {
            dimension,
            axis_start: pad_point(&params[..dimension]),
            axis_end: pad_point(&params[dimension..2 * dimension]),
            radius: scalars[0],
            magnitude: scalars[1],
            modulation: Sinusoid {
                frequency: scalars[2],
            },
        })
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    fn polarization(&self, point: &Point3<f64>, time: f64) -> Vector3<f64> {
        let axis = self.axis_end - self.axis_start;
        let height = axis.norm();
        if height == 0.0 {
            return Vector3::zeros();
        }

        let coordinates = AxialCoordinates::new(&self.axis_start, &axis, point);
        if coordinates.is_between_end_points(&axis)
            && coordinates.distance_from_axis() <= self.radius
        {
            axis * (self.magnitude / height * self.modulation.evaluate(time))
        }
        else {
            Vector3::zeros()
        }
    }
}

impl VectorSource for VoltaicPile {
    fn evaluate(&self, point: &[f64], time: f64, out: &mut [f64]) -> Result<(), SourceError> {
        check_dimension("voltaic pile", self.dimension, point, out)?;
        let value = self.polarization(&pad_point(point), time);
        out.copy_from_slice(&value.as_slice()[..self.dimension]);
        Ok(())
    }

    fn evaluate_at(&self, point: &Point3<f64>, time: f64) -> Result<Vector3<f64>, SourceError> {
        if self.dimension != 3 {
            return Err(SourceError::DimensionMismatch {
                kind: "voltaic pile",
                expected: self.dimension,
                got: 3,
            });
        }
        Ok(self.polarization(point, time))
    }
}
