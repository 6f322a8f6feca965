//! CSV trace of controller evaluations, one row per evaluation, for offline
//! tuning of the gains.

use serde::Serialize;
use std::io::Write;

use super::controller::TemperatureController;

#[derive(Debug, Clone, Serialize)]
pub struct TraceRecord {
    pub time: f64,
    pub dt: f64,
    pub input: f64,
    pub target: f64,
    pub error: f64,
    pub p: f64,
    pub i: f64,
    pub d: f64,
    pub output: f64,
    pub threshold: f64,
}

impl TraceRecord {
    pub fn capture(time: f64, controller: &TemperatureController) -> Self {
        let state = controller.state();
        let (p, i, d) = controller.terms();
        Self {
            time,
            dt: state.dt,
            input: state.input,
            target: state.target,
            error: state.error,
            p,
            i,
            d,
            output: state.output,
            threshold: controller.constants().threshold,
        }
    }
}

pub struct TraceWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> TraceWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(inner),
        }
    }

    pub fn record(&mut self, time: f64, controller: &TemperatureController) -> Result<(), csv::Error> {
        self.writer.serialize(TraceRecord::capture(time, controller))?;
        self.writer.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> Result<W, csv::Error> {
        self.writer
            .into_inner()
            .map_err(|e| csv::Error::from(e.into_error()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::temperature::constants::ControllerConstants;

    #[test]
    fn test_trace_header_and_row() {
        let mut pid = TemperatureController::new(ControllerConstants::new(2.0, 0.0, 0.0, 0.5), 20.0);
        pid.set_target(30.0);
        pid.update_temperature(20.0);
        pid.evaluate(0.5);

        let mut trace = TraceWriter::new(Vec::new());
        trace.record(1.5, &pid).unwrap();
        let bytes = trace.into_inner().unwrap();
        let text = String::from_utf8(bytes).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next(),
            Some("time,dt,input,target,error,p,i,d,output,threshold")
        );
        assert_eq!(lines.next(), Some("1.5,0.5,20.0,30.0,10.0,20.0,0.0,0.0,20.0,0.5"));
        assert_eq!(lines.next(), None);
    }
}
