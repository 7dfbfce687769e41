use std::ffi::CString;

use crate::error::{MediaError, Result};

/// Decoded video frame with raw pixel data.
pub struct VideoFrame {
    pub width: u32,
    pub height: u32,
    /// RGB pixel data, row-major, 3 bytes per pixel, no padding.
    pub data: Vec<u8>,
    /// Presentation timestamp in seconds.
    pub pts_secs: f64,
}

/// Trait for video decoders, enabling test mocking.
///
/// `open` takes anything the demuxer understands: a filesystem path or a URL.
pub trait VideoDecoder: Send {
    fn open(source: &str) -> Result<Self>
    where
        Self: Sized;

    fn decode_next_frame(&mut self) -> Result<Option<VideoFrame>>;

    fn seek_to(&mut self, timestamp_secs: f64) -> Result<()>;

    fn stream_info(&self) -> StreamInfo;
}

#[derive(Debug, Clone)]
pub struct StreamInfo {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub duration_secs: f64,
    pub codec_name: String,
}

pub struct FfmpegDecoder {
    input_ctx: rsmpeg::avformat::AVFormatContextInput,
    decode_ctx: rsmpeg::avcodec::AVCodecContext,
    sws_ctx: Option<rsmpeg::swscale::SwsContext>,
    video_stream_index: usize,
    stream_info: StreamInfo,
}

impl VideoDecoder for FfmpegDecoder {
    fn open(source: &str) -> Result<Self> {
        let c_source =
            CString::new(source).map_err(|_| MediaError::OpenFailed(source.to_string()))?;

        let input_ctx = rsmpeg::avformat::AVFormatContextInput::open(&c_source)
            .map_err(|e| MediaError::OpenFailed(format!("{source}: {e}")))?;

        let (video_stream_index, decoder) = {
            let streams = input_ctx.streams();
            let mut found = None;
            for (i, stream) in streams.iter().enumerate() {
                let codecpar = stream.codecpar();
                if codecpar.codec_type == rsmpeg::ffi::AVMEDIA_TYPE_VIDEO {
                    if let Some(decoder) = rsmpeg::avcodec::AVCodec::find_decoder(codecpar.codec_id)
                    {
                        found = Some((i, decoder));
                        break;
                    }
                }
            }
            found.ok_or(MediaError::NoVideoStream)?
        };

        let mut decode_ctx = rsmpeg::avcodec::AVCodecContext::new(&decoder);
        {
            let streams = input_ctx.streams();
            decode_ctx
                .apply_codecpar(&streams[video_stream_index].codecpar())
                .map_err(|e| MediaError::DecoderError(format!("apply_codecpar: {e}")))?;
        }

        decode_ctx
            .open(None)
            .map_err(|e| MediaError::DecoderError(format!("open: {e}")))?;

        let stream_info = {
            let streams = input_ctx.streams();
            let video_stream = &streams[video_stream_index];
            let tb = video_stream.time_base;
            let duration_secs = if video_stream.duration > 0 {
                video_stream.duration as f64 * tb.num as f64 / tb.den as f64
            } else {
                input_ctx.duration as f64 / rsmpeg::ffi::AV_TIME_BASE as f64
            };
            let r = video_stream.r_frame_rate;
            let fps = if r.den > 0 {
                r.num as f64 / r.den as f64
            } else {
                30.0
            };
            StreamInfo {
                width: decode_ctx.width as u32,
                height: decode_ctx.height as u32,
                fps,
                duration_secs,
                codec_name: decoder.name().to_string_lossy().to_string(),
            }
        };

        Ok(Self {
            input_ctx,
            decode_ctx,
            sws_ctx: None,
            video_stream_index,
            stream_info,
        })
    }

    fn decode_next_frame(&mut self) -> Result<Option<VideoFrame>> {
        loop {
            match self.input_ctx.read_packet() {
                Ok(Some(packet)) => {
                    if packet.stream_index as usize != self.video_stream_index {
                        continue;
                    }
                    self.decode_ctx
                        .send_packet(Some(&packet))
                        .map_err(|e| MediaError::DecoderError(format!("send_packet: {e}")))?;

                    match self.decode_ctx.receive_frame() {
                        Ok(frame) => return Ok(Some(self.frame_to_rgb(&frame)?)),
                        Err(_) => continue,
                    }
                }
                Ok(None) => {
                    // EOF: drain whatever the decoder still buffers.
                    self.decode_ctx.send_packet(None).ok();
                    match self.decode_ctx.receive_frame() {
                        Ok(frame) => return Ok(Some(self.frame_to_rgb(&frame)?)),
                        Err(_) => return Ok(None),
                    }
                }
                Err(e) => return Err(MediaError::DecoderError(format!("read_packet: {e}"))),
            }
        }
    }

    fn seek_to(&mut self, timestamp_secs: f64) -> Result<()> {
        let tb = self.input_ctx.streams()[self.video_stream_index].time_base;
        let ts = (timestamp_secs * tb.den as f64 / tb.num as f64) as i64;

        self.input_ctx
            .seek(
                self.video_stream_index as i32,
                ts,
                rsmpeg::ffi::AVSEEK_FLAG_BACKWARD as i32,
            )
            .map_err(|e| MediaError::SeekError(format!("{e}")))?;

        self.decode_ctx.flush_buffers();

        Ok(())
    }

    fn stream_info(&self) -> StreamInfo {
        self.stream_info.clone()
    }
}

impl FfmpegDecoder {
    fn frame_to_rgb(&mut self, frame: &rsmpeg::avutil::AVFrame) -> Result<VideoFrame> {
        let (width, height) = (frame.width, frame.height);
        let dst_fmt = rsmpeg::ffi::AV_PIX_FMT_RGB24;

        if self.sws_ctx.is_none() {
            self.sws_ctx = rsmpeg::swscale::SwsContext::get_context(
                width,
                height,
                frame.format,
                width,
                height,
                dst_fmt,
                rsmpeg::ffi::SWS_BILINEAR,
                None,
                None,
                None,
            );
        }
        let sws = self
            .sws_ctx
            .as_mut()
            .ok_or_else(|| MediaError::DecoderError("failed to create sws context".into()))?;

        let mut dst_frame = rsmpeg::avutil::AVFrame::new();
        dst_frame.set_width(width);
        dst_frame.set_height(height);
        dst_frame.set_format(dst_fmt);
        dst_frame
            .alloc_buffer()
            .map_err(|e| MediaError::DecoderError(format!("alloc_buffer: {e}")))?;

        sws.scale_frame(frame, 0, height, &mut dst_frame)
            .map_err(|e| MediaError::DecoderError(format!("scale_frame: {e}")))?;

        // Rows in the scaled frame may be padded; copy them out tightly packed.
        let row_bytes = width as usize * 3;
        let stride = dst_frame.linesize[0] as usize;
        let mut data = Vec::with_capacity(row_bytes * height as usize);
        for y in 0..height as usize {
            let row = unsafe {
                std::slice::from_raw_parts(dst_frame.data[0].add(y * stride) as *const u8, row_bytes)
            };
            data.extend_from_slice(row);
        }

        let tb = self.input_ctx.streams()[self.video_stream_index].time_base;
        let pts_secs = if frame.pts != rsmpeg::ffi::AV_NOPTS_VALUE {
            frame.pts as f64 * tb.num as f64 / tb.den as f64
        } else {
            0.0
        };

        Ok(VideoFrame {
            width: width as u32,
            height: height as u32,
            data,
            pts_secs,
        })
    }
}
