//! Presents preview frames in a window.
//!
//! Each preview window owns a surface and a texture holding the last frame it was sent. Frames are
//! stretched over the whole window by a single triangle (`shader.wgsl`). The window is created at
//! the size of the first frame, so normally there's no scaling.

use std::rc::Rc;

use anyhow::Context;
use wgpu::*;
use winit::{
    dpi::PhysicalSize,
    event_loop::EventLoopWindowTarget,
    window::{Window, WindowBuilder},
};

use crate::image::Resolution;

/// Graphics adapter and device shared by all preview windows.
pub struct Gpu {
    instance: Instance,
    adapter: Adapter,
    device: Device,
    queue: Queue,
}

impl Gpu {
    pub async fn open() -> anyhow::Result<Self> {
        // Vulkan, Metal and DX12 only; the GL backend is not reliable with winit surfaces.
        let instance = Instance::new(InstanceDescriptor {
            backends: Backends::PRIMARY,
            ..Default::default()
        });
        let adapter = instance
            .request_adapter(&RequestAdapterOptions::default())
            .await
            .context("no graphics adapter found")?;
        let info = adapter.get_info();
        log::info!("rendering previews on {} ({:?})", info.name, info.backend);

        let (device, queue) = adapter
            .request_device(
                &DeviceDescriptor {
                    label: Some("preview"),
                    features: Features::empty(),
                    // Downlevel defaults cap textures at 2048 pixels, less than some webcams send.
                    limits: Limits::downlevel_defaults().using_resolution(adapter.limits()),
                },
                None,
            )
            .await
            .context("failed to open graphics device")?;

        Ok(Self {
            instance,
            adapter,
            device,
            queue,
        })
    }
}

/// The last frame sent to a window, bound for sampling.
struct Frame {
    texture: Texture,
    bind_group: BindGroup,
    resolution: Resolution,
}

/// A preview window and what is needed to present frames in it.
pub struct Renderer {
    title: String,
    gpu: Rc<Gpu>,
    frame_layout: BindGroupLayout,
    sampler: Sampler,
    pipeline: RenderPipeline,
    frame: Option<Frame>,
    surface_config: SurfaceConfiguration,
    surface: Surface,
    // Declared after `surface`, which must be dropped first.
    window: Window,
}

impl Renderer {
    /// Opens a window titled `title`, sized to fit frames of `resolution`.
    pub fn open<T>(
        target: &EventLoopWindowTarget<T>,
        title: &str,
        resolution: Resolution,
        gpu: Rc<Gpu>,
    ) -> anyhow::Result<Self> {
        let window = WindowBuilder::new()
            .with_title(title)
            .with_inner_size(PhysicalSize::new(resolution.width(), resolution.height()))
            .with_resizable(false)
            .build(target)?;

        // SAFETY: `window` is stored alongside `surface` and outlives it.
        let surface = unsafe { gpu.instance.create_surface(&window) }
            .context("failed to create window surface")?;
        let format = *surface
            .get_capabilities(&gpu.adapter)
            .formats
            .first()
            .context("graphics adapter cannot present to the preview window")?;

        let size = window.inner_size();
        let surface_config = SurfaceConfiguration {
            usage: TextureUsages::RENDER_ATTACHMENT,
            format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: PresentMode::Fifo,
            alpha_mode: CompositeAlphaMode::Auto,
            view_formats: Vec::new(),
        };
        surface.configure(&gpu.device, &surface_config);
        log::debug!(
            "'{}': {}x{} surface ({:?})",
            title,
            surface_config.width,
            surface_config.height,
            format
        );

        let frame_layout = gpu
            .device
            .create_bind_group_layout(&BindGroupLayoutDescriptor {
                label: Some("frame"),
                entries: &[
                    BindGroupLayoutEntry {
                        binding: 0,
                        visibility: ShaderStages::FRAGMENT,
                        ty: BindingType::Texture {
                            sample_type: TextureSampleType::Float { filterable: false },
                            view_dimension: TextureViewDimension::D2,
                            multisampled: false,
                        },
                        count: None,
                    },
                    BindGroupLayoutEntry {
                        binding: 1,
                        visibility: ShaderStages::FRAGMENT,
                        ty: BindingType::Sampler(SamplerBindingType::NonFiltering),
                        count: None,
                    },
                ],
            });
        let shader = gpu.device.create_shader_module(ShaderModuleDescriptor {
            label: Some("preview"),
            source: ShaderSource::Wgsl(include_str!("shader.wgsl").into()),
        });
        let pipeline_layout = gpu
            .device
            .create_pipeline_layout(&PipelineLayoutDescriptor {
                label: Some("preview"),
                bind_group_layouts: &[&frame_layout],
                push_constant_ranges: &[],
            });
        let pipeline = gpu
            .device
            .create_render_pipeline(&RenderPipelineDescriptor {
                label: Some("preview"),
                layout: Some(&pipeline_layout),
                vertex: VertexState {
                    module: &shader,
                    entry_point: "vert",
                    buffers: &[],
                },
                fragment: Some(FragmentState {
                    module: &shader,
                    entry_point: "frag",
                    targets: &[Some(format.into())],
                }),
                primitive: PrimitiveState::default(),
                depth_stencil: None,
                multisample: MultisampleState::default(),
                multiview: None,
            });
        // Nearest-neighbor sampling.
        let sampler = gpu.device.create_sampler(&SamplerDescriptor::default());

        Ok(Self {
            title: title.to_string(),
            gpu,
            frame_layout,
            sampler,
            pipeline,
            frame: None,
            surface_config,
            surface,
            window,
        })
    }

    pub fn window(&self) -> &Window {
        &self.window
    }

    /// Replaces the frame shown in the window with `rgba` pixels of size `resolution`.
    pub fn upload(&mut self, resolution: Resolution, rgba: &[u8]) {
        if rgba.len() as u64 != resolution.num_pixels() * 4 {
            log::error!(
                "'{}': got {} bytes for a {} frame",
                self.title,
                rgba.len(),
                resolution
            );
            return;
        }

        let extent = Extent3d {
            width: resolution.width(),
            height: resolution.height(),
            depth_or_array_layers: 1,
        };
        if self
            .frame
            .as_ref()
            .map_or(true, |frame| frame.resolution != resolution)
        {
            self.frame = Some(self.create_frame(extent, resolution));
        }
        let Some(frame) = &self.frame else {
            return;
        };
        self.gpu.queue.write_texture(
            frame.texture.as_image_copy(),
            rgba,
            ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(4 * resolution.width()),
                rows_per_image: None,
            },
            extent,
        );
    }

    fn create_frame(&self, extent: Extent3d, resolution: Resolution) -> Frame {
        log::trace!("allocating {} frame texture", resolution);
        let texture = self.gpu.device.create_texture(&TextureDescriptor {
            label: Some("frame"),
            size: extent,
            mip_level_count: 1,
            sample_count: 1,
            dimension: TextureDimension::D2,
            format: TextureFormat::Rgba8UnormSrgb,
            usage: TextureUsages::TEXTURE_BINDING | TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let view = texture.create_view(&TextureViewDescriptor::default());
        let bind_group = self.gpu.device.create_bind_group(&BindGroupDescriptor {
            label: Some("frame"),
            layout: &self.frame_layout,
            entries: &[
                BindGroupEntry {
                    binding: 0,
                    resource: BindingResource::TextureView(&view),
                },
                BindGroupEntry {
                    binding: 1,
                    resource: BindingResource::Sampler(&self.sampler),
                },
            ],
        });
        Frame {
            texture,
            bind_group,
            resolution,
        }
    }

    /// Presents the current frame. A window without a frame is cleared to black.
    pub fn redraw(&mut self) {
        let output = match self.surface.get_current_texture() {
            Ok(output) => output,
            Err(SurfaceError::Outdated | SurfaceError::Lost) => {
                self.surface
                    .configure(&self.gpu.device, &self.surface_config);
                match self.surface.get_current_texture() {
                    Ok(output) => output,
                    Err(e) => {
                        log::error!("'{}': cannot present: {}", self.title, e);
                        return;
                    }
                }
            }
            // Hidden windows time out; the next frame retries.
            Err(e) => {
                log::debug!("'{}': skipping redraw: {}", self.title, e);
                return;
            }
        };

        let view = output
            .texture
            .create_view(&TextureViewDescriptor::default());
        let mut encoder = self
            .gpu
            .device
            .create_command_encoder(&CommandEncoderDescriptor { label: None });
        {
            let mut pass = encoder.begin_render_pass(&RenderPassDescriptor {
                label: Some("preview"),
                color_attachments: &[Some(RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: Operations {
                        load: LoadOp::Clear(Color::BLACK),
                        store: true,
                    },
                })],
                depth_stencil_attachment: None,
            });
            if let Some(frame) = &self.frame {
                pass.set_pipeline(&self.pipeline);
                pass.set_bind_group(0, &frame.bind_group, &[]);
                pass.draw(0..3, 0..1);
            }
        }
        self.gpu.queue.submit([encoder.finish()]);
        output.present();
    }
}
