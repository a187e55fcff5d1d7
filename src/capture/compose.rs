// Combines acquired streams into the single stream handed to the recorder.

use tracing::{debug, warn};

use super::platform::{AudioMixer, MediaPlatform};
use super::stream::{MediaStream, MediaTrack};

/// A recordable stream assembled from the acquired sources.
///
/// Owns the source streams and any mixer backing the combined audio track,
/// so tearing the composition down releases everything the recording held.
pub struct Composition {
    stream: MediaStream,
    sources: Vec<MediaStream>,
    mixer: Option<Box<dyn AudioMixer>>,
}

impl Composition {
    /// The stream the recorder should consume.
    pub fn stream(&self) -> &MediaStream {
        &self.stream
    }

    pub fn has_audio(&self) -> bool {
        self.stream.has_audio()
    }

    pub fn has_video(&self) -> bool {
        self.stream.has_video()
    }

    /// Tracks of the original source streams, the ones that can end when a
    /// device unplugs or a shared surface closes.
    pub fn source_tracks(&self) -> Vec<MediaTrack> {
        self.sources
            .iter()
            .flat_map(|s| s.tracks().iter().cloned())
            .collect()
    }

    /// Stop every source track and tear down the mixer. Idempotent.
    pub fn shutdown(&mut self) {
        if let Some(mut mixer) = self.mixer.take() {
            mixer.shutdown();
        }
        for source in &self.sources {
            source.stop_all();
        }
    }
}

/// Compose the recordable stream from optional screen and microphone streams.
///
/// Video tracks pass straight through. Audio follows a count rule: no audio
/// sources means a silent recording, exactly one passes through untouched,
/// and two or more are merged through a platform mixer into a single track.
/// Mixer trouble degrades rather than fails: a source that cannot be routed
/// is dropped from the mix, and if no mixer is available at all the first
/// audio source is recorded on its own.
pub fn compose(
    platform: &dyn MediaPlatform,
    screen: Option<MediaStream>,
    mic: Option<MediaStream>,
) -> Composition {
    let sources: Vec<MediaStream> = screen.into_iter().chain(mic).collect();

    let mut video_tracks = Vec::new();
    let mut audio_tracks = Vec::new();
    for source in &sources {
        video_tracks.extend(source.video_tracks());
        audio_tracks.extend(source.audio_tracks());
    }

    let (audio_out, mixer) = select_audio(platform, &audio_tracks);

    let mut tracks = video_tracks;
    tracks.extend(audio_out);
    debug!(
        "composed recording stream: {} video, {} audio (mixed={})",
        tracks.iter().filter(|t| t.kind().is_video()).count(),
        tracks.iter().filter(|t| t.kind().is_audio()).count(),
        mixer.is_some()
    );

    Composition {
        stream: MediaStream::new(tracks),
        sources,
        mixer,
    }
}

fn select_audio(
    platform: &dyn MediaPlatform,
    audio_tracks: &[MediaTrack],
) -> (Vec<MediaTrack>, Option<Box<dyn AudioMixer>>) {
    match audio_tracks {
        [] => (Vec::new(), None),
        [only] => (vec![only.clone()], None),
        several => {
            let mut mixer = match platform.create_mixer() {
                Ok(mixer) => mixer,
                Err(e) => {
                    warn!(
                        "audio mixer unavailable ({}), recording '{}' only",
                        e,
                        several[0].label()
                    );
                    return (vec![several[0].clone()], None);
                }
            };

            let mut connected = 0;
            for track in several {
                match mixer.connect(track) {
                    Ok(()) => connected += 1,
                    Err(e) => warn!("dropping '{}' from the audio mix: {}", track.label(), e),
                }
            }

            if connected == 0 {
                warn!(
                    "no audio source could be routed, recording '{}' only",
                    several[0].label()
                );
                mixer.shutdown();
                return (vec![several[0].clone()], None);
            }

            let output = mixer.output_track();
            (vec![output], Some(mixer))
        }
    }
}
