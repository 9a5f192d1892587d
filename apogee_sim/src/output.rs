// apogee_sim/src/output.rs

//! CSV writers for generated flights and filter estimates.

use std::path::Path;

use csv::Writer;
use nalgebra::Vector3;

use crate::error::DatasetError;
use crate::generation::real_log::{
    acceleration_header, angular_velocity_header, orientation_header, position_header,
    velocity_header, TimeUnit, AXES, QUATERNION_AXES,
};
use crate::generation::FlightData;
use crate::runner::EstimateRecord;

/// Writes `data` in the flight-log column layout, so it can be replayed with
/// [`RealLogLoader`](crate::generation::real_log::RealLogLoader).
pub fn write_flight_csv(path: &Path, data: &FlightData, time_unit: TimeUnit) -> Result<(), DatasetError> {
    let write_error = |source| DatasetError::Write {
        path: path.to_path_buf(),
        source,
    };
    let mut writer = Writer::from_path(path).map_err(write_error)?;

    let mut header = vec![time_unit.header().to_string()];
    header.extend(AXES.iter().map(|&a| position_header(a)));
    if data.velocity.is_some() {
        header.extend(AXES.iter().map(|&a| velocity_header(a)));
    }
    header.extend(AXES.iter().map(|&a| acceleration_header(a)));
    if data.attitude.is_some() {
        header.extend(QUATERNION_AXES.iter().map(|&a| orientation_header(a)));
    }
    if data.angular_velocity.is_some() {
        header.extend(AXES.iter().map(|&a| angular_velocity_header(a)));
    }
    writer.write_record(&header).map_err(write_error)?;

    for i in 0..data.len() {
        let mut row = vec![time_unit.from_seconds(data.time[i]).to_string()];
        push_vector(&mut row, &data.position[i]);
        if let Some(velocity) = &data.velocity {
            push_vector(&mut row, &velocity[i]);
        }
        push_vector(&mut row, &data.acceleration[i]);
        if data.attitude.is_some() {
            let q = data.attitude_at(i);
            row.extend([q.w, q.i, q.j, q.k].iter().map(|x| x.to_string()));
        }
        if let Some(rates) = &data.angular_velocity {
            push_vector(&mut row, &rates[i]);
        }
        writer.write_record(&row).map_err(write_error)?;
    }
    writer.flush().map_err(|e| write_error(e.into()))
}

/// One row per filter step: time, the six state components, and their standard deviations.
pub fn write_estimates_csv(path: &Path, estimates: &[EstimateRecord]) -> Result<(), DatasetError> {
    let write_error = |source| DatasetError::Write {
        path: path.to_path_buf(),
        source,
    };
    let mut writer = Writer::from_path(path).map_err(write_error)?;

    writer
        .write_record([
            "time", "px", "py", "pz", "vx", "vy", "vz", "sigma_px", "sigma_py", "sigma_pz",
            "sigma_vx", "sigma_vy", "sigma_vz",
        ])
        .map_err(write_error)?;
    for record in estimates {
        let row = std::iter::once(record.time)
            .chain(record.state.iter().copied())
            .chain(record.std_devs.iter().copied())
            .map(|v| v.to_string());
        writer.write_record(row).map_err(write_error)?;
    }
    writer.flush().map_err(|e| write_error(e.into()))
}

fn push_vector(row: &mut Vec<String>, v: &Vector3<f64>) {
    row.extend(v.iter().map(|x| x.to_string()));
}
