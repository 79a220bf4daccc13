use crate::all::*;

use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use std::thread::JoinHandle;

// Frames queued ahead of the worker before the producer blocks. The only
// back-pressure mechanism upstream.
const INPUT_QUEUE_CAPACITY: usize = 10;

// Long-lived tracking worker coupled to its caller through three channels:
// a bounded input queue of frame bundles, an unbounded output queue of
// results, and a latest-wins side channel for scene depth guesses from the
// back-end. The caller terminates the stream by pushing `None`; the worker
// forwards one `None` downstream and exits. Frames are processed and
// emitted strictly in input order.
pub struct Pipeline {
  input: Sender<Option<FrameInput>>,
  input_depth: Sender<f64>,
  output: Receiver<Option<FrameResult>>,
  worker: Option<JoinHandle<()>>,
}

impl Pipeline {
  pub fn new(calibration: Calibration) -> Result<Pipeline> {
    let parameters = PARAMETER_SET.lock().unwrap().clone();
    Pipeline::with_parameters(calibration, &parameters)
  }

  pub fn with_parameters(calibration: Calibration, parameters: &ParameterSet) -> Result<Pipeline> {
    if parameters.optical_flow_skip_frames == 0 {
      bail!("Frame skip divisor must be at least one.");
    }
    let skip_frames = parameters.optical_flow_skip_frames;
    let mut depth_guess = parameters.optical_flow_matching_default_depth;
    let mut tracker = Tracker::with_parameters(calibration, parameters)?;

    let (input, input_rx) = bounded::<Option<FrameInput>>(INPUT_QUEUE_CAPACITY);
    let (input_depth, depth_rx) = unbounded::<f64>();
    let (output_tx, output) = unbounded::<Option<FrameResult>>();

    let worker = std::thread::spawn(move || {
      let mut frame_counter: usize = 0;
      loop {
        while let Ok(depth) = depth_rx.try_recv() {
          depth_guess = depth;
        }

        // A dropped sender counts as end of stream.
        let next = input_rx.recv().unwrap_or(None);
        let Some(frame) = next else {
          let _ = output_tx.send(None);
          break;
        };

        // Guesses that arrived while blocked on the input queue still apply
        // to this frame.
        while let Ok(depth) = depth_rx.try_recv() {
          depth_guess = depth;
        }

        let frame = Arc::new(frame);
        if let Some(result) = tracker.process_frame(&frame, depth_guess) {
          if frame_counter % skip_frames == 0 && output_tx.send(Some(result)).is_err() {
            warn!("Result consumer disappeared, stopping tracker worker.");
            break;
          }
          frame_counter += 1;
        }
      }
      info!("Tracker worker exiting after {} frames.", frame_counter);
    });

    Ok(Pipeline {
      input,
      input_depth,
      output,
      worker: Some(worker),
    })
  }

  // Blocks while the input queue is full.
  pub fn push_frame(&self, frame: FrameInput) -> Result<()> {
    self.input.send(Some(frame))
      .map_err(|_| anyhow!("Tracker worker has exited."))
  }

  pub fn push_depth_guess(&self, depth: f64) -> Result<()> {
    self.input_depth.send(depth)
      .map_err(|_| anyhow!("Tracker worker has exited."))
  }

  // Signals end of stream. The worker finishes queued frames, emits a final
  // `None` on the output queue and exits.
  pub fn finish(&self) -> Result<()> {
    self.input.send(None)
      .map_err(|_| anyhow!("Tracker worker has exited."))
  }

  pub fn output(&self) -> &Receiver<Option<FrameResult>> {
    &self.output
  }
}

impl Drop for Pipeline {
  fn drop(&mut self) {
    // Idempotent with an earlier finish(); the worker never blocks pushing
    // output, so the join cannot deadlock.
    let _ = self.input.send(None);
    if let Some(worker) = self.worker.take() {
      let _ = worker.join();
    }
  }
}
