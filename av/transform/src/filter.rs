/*!
    Two-input audio mixing graph (avfilter).
*/

use std::ffi::{CString, c_int};
use std::ptr;

use ffmpeg_next::{ffi, frame::Audio as AudioFrame};

use av_io::check_ffmpeg;
use av_types::{Error, Result};

use crate::alloc_failed;
use crate::format::FrameFormat;

const INPUT_NAMES: [&str; 2] = ["abuffer@in1", "abuffer@in2"];
const SINK_NAME: &str = "abuffersink@out";

/**
    A configured `amix` filter graph with two audio inputs.

    Frames pushed into either input are mixed into a single stream pulled
    from the output. The graph buffers internally until every input has
    contributed; signal each input's end with [`MixGraph::finish_input`]
    and keep pulling until [`av_types::Error::Eof`].
*/
pub struct MixGraph {
    graph: *mut ffi::AVFilterGraph,
    inputs: [*mut ffi::AVFilterContext; 2],
    sink: *mut ffi::AVFilterContext,
}

// SAFETY: the graph and its filter contexts are owned exclusively by this
// value and only used through &mut self.
unsafe impl Send for MixGraph {}

impl MixGraph {
    /**
        Build and configure a graph mixing two inputs of the given formats.

        The mix runs for as long as the longest input and is pulled in the
        format avfilter negotiates; read it back with
        [`MixGraph::output_format`] to configure the next stage.
    */
    pub fn new(first: FrameFormat, second: FrameFormat) -> Result<Self> {
        ffmpeg_next::init().map_err(|e| Error::codec(e.to_string()))?;

        let spec = format!(
            "{in1}=time_base=1/{r1}:sample_rate={r1}:sample_fmt={f1}:channel_layout={l1} [a1]; \
             {in2}=time_base=1/{r2}:sample_rate={r2}:sample_fmt={f2}:channel_layout={l2} [a2]; \
             [a1] [a2] amix@mix=inputs=2:duration=longest [mixed]; \
             [mixed] {sink}",
            in1 = INPUT_NAMES[0],
            in2 = INPUT_NAMES[1],
            sink = SINK_NAME,
            r1 = first.sample_rate,
            f1 = first.sample_format_name(),
            l1 = first.channel_layout_name(),
            r2 = second.sample_rate,
            f2 = second.sample_format_name(),
            l2 = second.channel_layout_name(),
        );
        let c_spec =
            CString::new(spec.clone()).map_err(|_| Error::invalid_data("NUL in graph spec"))?;

        let mut graph = unsafe { ffi::avfilter_graph_alloc() };
        if graph.is_null() {
            return Err(alloc_failed("avfilter_graph_alloc"));
        }

        unsafe {
            let mut inputs: *mut ffi::AVFilterInOut = ptr::null_mut();
            let mut outputs: *mut ffi::AVFilterInOut = ptr::null_mut();
            let ret =
                ffi::avfilter_graph_parse2(graph, c_spec.as_ptr(), &mut inputs, &mut outputs);
            ffi::avfilter_inout_free(&mut inputs);
            ffi::avfilter_inout_free(&mut outputs);
            if ret < 0 {
                ffi::avfilter_graph_free(&mut graph);
                check_ffmpeg(ret, "avfilter_graph_parse2")?;
            }

            let ret = ffi::avfilter_graph_config(graph, ptr::null_mut());
            if ret < 0 {
                ffi::avfilter_graph_free(&mut graph);
                check_ffmpeg(ret, "avfilter_graph_config")?;
            }
        }

        let mut resolved: [*mut ffi::AVFilterContext; 2] = [ptr::null_mut(); 2];
        for (slot, name) in resolved.iter_mut().zip(INPUT_NAMES) {
            match find_filter(graph, name) {
                Ok(ctx) => *slot = ctx,
                Err(e) => {
                    unsafe { ffi::avfilter_graph_free(&mut graph) };
                    return Err(e);
                }
            }
        }
        let sink = match find_filter(graph, SINK_NAME) {
            Ok(ctx) => ctx,
            Err(e) => {
                unsafe { ffi::avfilter_graph_free(&mut graph) };
                return Err(e);
            }
        };

        tracing::debug!(spec = %spec, "mix graph configured");
        Ok(Self {
            graph,
            inputs: resolved,
            sink,
        })
    }

    /**
        Feed a frame into input `index` (0 or 1).
    */
    pub fn push(&mut self, index: usize, frame: &AudioFrame) -> Result<()> {
        let ctx = self.input_ctx(index)?;
        let ret = unsafe { ffi::av_buffersrc_write_frame(ctx, frame.as_ptr()) };
        check_ffmpeg(ret, "av_buffersrc_write_frame")
    }

    /**
        Mark input `index` as finished.

        The mix keeps producing until every input is finished and the
        buffered tail has drained.
    */
    pub fn finish_input(&mut self, index: usize) -> Result<()> {
        let ctx = self.input_ctx(index)?;
        let ret = unsafe { ffi::av_buffersrc_write_frame(ctx, ptr::null()) };
        check_ffmpeg(ret, "av_buffersrc_write_frame")
    }

    /**
        Pull the next mixed frame.

        Returns `Ok(None)` when the graph needs more input, and
        `Err(Error::Eof)` once all inputs are finished and drained.
    */
    pub fn pull(&mut self) -> Result<Option<AudioFrame>> {
        let mut frame = AudioFrame::empty();
        let ret = unsafe { ffi::av_buffersink_get_frame(self.sink, frame.as_mut_ptr()) };
        if ret == ffi::AVERROR(ffi::EAGAIN) {
            return Ok(None);
        }
        if ret == ffi::AVERROR_EOF {
            return Err(Error::Eof);
        }
        check_ffmpeg(ret, "av_buffersink_get_frame")?;
        Ok(Some(frame))
    }

    /**
        The format the graph delivers mixed frames in.
    */
    pub fn output_format(&self) -> FrameFormat {
        unsafe {
            let raw = ffi::av_buffersink_get_format(self.sink);
            // Negotiated formats are valid AVSampleFormat values.
            let sample_format: ffi::AVSampleFormat = std::mem::transmute(raw as c_int);
            FrameFormat::new(
                ffi::av_buffersink_get_sample_rate(self.sink),
                ffi::av_buffersink_get_channels(self.sink),
                sample_format,
            )
        }
    }

    fn input_ctx(&self, index: usize) -> Result<*mut ffi::AVFilterContext> {
        self.inputs
            .get(index)
            .copied()
            .ok_or_else(|| Error::invalid_data(format!("mix input {index} out of range")))
    }
}

fn find_filter(graph: *mut ffi::AVFilterGraph, name: &str) -> Result<*mut ffi::AVFilterContext> {
    let c_name = CString::new(name).map_err(|_| Error::invalid_data("NUL in filter name"))?;
    let ctx = unsafe { ffi::avfilter_graph_get_filter(graph, c_name.as_ptr()) };
    if ctx.is_null() {
        return Err(Error::invalid_data(format!("filter {name} missing from graph")));
    }
    Ok(ctx)
}

impl Drop for MixGraph {
    fn drop(&mut self) {
        // Frees the filter contexts along with the graph.
        unsafe { ffi::avfilter_graph_free(&mut self.graph) };
    }
}

impl std::fmt::Debug for MixGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MixGraph")
            .field("inputs", &self.inputs.len())
            .finish_non_exhaustive()
    }
}
