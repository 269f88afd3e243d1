//! 参数合并
//!
//! 旧版前端的位置参数 (宽高比、时长、分辨率、参考图) 与模型 schema 描述的
//! 动态参数在这里合并成一次后端调用的参数表。优先级从高到低:
//!
//! 1. 动态参数中出现的键始终保留原值
//! 2. 动态参数没有尺寸类键时, 把旧版宽高比翻译成后端的枚举值注入
//! 3. 显式的 `WxH` 分辨率在没有尺寸类键时转成 `{width, height}`
//! 4. 参考图按后端约定写入单值键或列表键
//!
//! 除此之外不做任何归一化。

use mediagen_domain::{parse_duration_seconds, Resolution};
use serde_json::{json, Map, Value};

use crate::provider::{ImageGeneration, VideoGeneration};

/// 对话补全后端放在请求顶层的采样参数
pub const SAMPLING_KEYS: [&str; 3] = ["seed", "temperature", "top_p"];
pub const MAX_MULTI_REFERENCES: usize = 3;

/// 对话补全后端的参数拆分结果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatArguments {
    /// 平铺进请求体的扩展参数
    pub extension: Map<String, Value>,
    pub sampling: Map<String, Value>,
    pub references: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ParameterResolver {
    multi_reference_markers: Vec<String>,
}

impl Default for ParameterResolver {
    fn default() -> Self {
        Self::new(vec!["nano-banana".to_string(), "multi-image".to_string()])
    }
}

impl ParameterResolver {
    pub fn new(multi_reference_markers: Vec<String>) -> Self {
        Self {
            multi_reference_markers,
        }
    }

    /// 后端路径包含任一多参考图标记
    pub fn is_multi_reference(&self, model_path: &str) -> bool {
        self.multi_reference_markers
            .iter()
            .any(|marker| model_path.contains(marker.as_str()))
    }

    /// 队列式后端的图片参数
    pub fn batch_image(&self, request: &ImageGeneration) -> Map<String, Value> {
        let mut arguments = Map::new();
        arguments.insert("prompt".to_string(), json!(request.prompt));
        arguments.insert("num_images".to_string(), json!(request.num_images));
        arguments.insert("safety_tolerance".to_string(), json!("2"));

        let has_size_key = request.parameters.contains_key("image_size")
            || request.parameters.contains_key("aspect_ratio");
        merge_parameters(&mut arguments, &request.parameters);

        if !has_size_key {
            let image_size = request
                .resolution
                .as_deref()
                .and_then(Resolution::parse)
                .map(|r| json!({ "width": r.width, "height": r.height }))
                .unwrap_or_else(|| json!(batch_image_size(&request.aspect_ratio)));
            arguments.insert("image_size".to_string(), image_size);
        }

        if self.is_multi_reference(&request.model_path) {
            attach_list(&mut arguments, "image_urls", &request.references);
        } else {
            attach_single(&mut arguments, "image_url", request.references.first());
        }
        arguments
    }

    /// 队列式后端的视频参数
    pub fn batch_video(&self, request: &VideoGeneration) -> Map<String, Value> {
        let mut arguments = Map::new();
        arguments.insert("prompt".to_string(), json!(request.prompt));
        arguments.insert("duration".to_string(), json!(request.duration));
        arguments.insert("aspect_ratio".to_string(), json!(request.aspect_ratio));
        merge_parameters(&mut arguments, &request.parameters);
        attach_single(&mut arguments, "image_url", request.references.first());
        arguments
    }

    /// 模型目录式后端的图片参数; 宽高比原样透传
    pub fn catalog_image(&self, request: &ImageGeneration) -> Map<String, Value> {
        let mut arguments = Map::new();
        arguments.insert("prompt".to_string(), json!(request.prompt));
        if !request.aspect_ratio.is_empty() {
            arguments.insert("aspect_ratio".to_string(), json!(request.aspect_ratio));
        }
        merge_parameters(&mut arguments, &request.parameters);

        if self.is_multi_reference(&request.model_path) {
            attach_list(&mut arguments, "image_input", &request.references);
        } else {
            attach_single(&mut arguments, "image", request.references.first());
        }
        arguments
    }

    /// 模型目录式后端的视频参数
    ///
    /// 时长 `"5s"` 转为整数 `5`, 无法解析时不传。两张及以上参考图作为首尾帧。
    pub fn catalog_video(&self, request: &VideoGeneration) -> Map<String, Value> {
        let mut arguments = Map::new();
        arguments.insert("prompt".to_string(), json!(request.prompt));
        if let Some(seconds) = parse_duration_seconds(&request.duration) {
            arguments.insert("duration".to_string(), json!(seconds));
        }
        if !request.aspect_ratio.is_empty() {
            arguments.insert("aspect_ratio".to_string(), json!(request.aspect_ratio));
        }
        merge_parameters(&mut arguments, &request.parameters);

        match request.references.as_slice() {
            [] => {}
            [single] => attach_single(&mut arguments, "image", Some(single)),
            [start, end, ..] => {
                attach_single(&mut arguments, "start_image", Some(start));
                attach_single(&mut arguments, "end_image", Some(end));
            }
        }
        arguments
    }

    /// 对话补全后端: 采样参数放顶层, 其余进扩展体
    pub fn chat(&self, request: &ImageGeneration) -> ChatArguments {
        let mut resolved = ChatArguments::default();
        for (key, value) in &request.parameters {
            if SAMPLING_KEYS.contains(&key.as_str()) {
                resolved.sampling.insert(key.clone(), value.clone());
            } else {
                resolved.extension.insert(key.clone(), value.clone());
            }
        }

        let has_size_key = resolved.extension.contains_key("aspect_ratio")
            || resolved.extension.contains_key("resolution");
        if !has_size_key && !request.aspect_ratio.is_empty() {
            let resolution = request
                .resolution
                .as_deref()
                .map(str::trim)
                .filter(|r| !r.is_empty())
                .unwrap_or_else(|| chat_resolution(&request.aspect_ratio));
            resolved
                .extension
                .insert("aspect_ratio".to_string(), json!(request.aspect_ratio));
            resolved
                .extension
                .insert("resolution".to_string(), json!(resolution));
        }

        let limit = if self.is_multi_reference(&request.model_path) {
            MAX_MULTI_REFERENCES
        } else {
            1
        };
        resolved.references = request.references.iter().take(limit).cloned().collect();
        resolved
    }
}

/// 宽高比 -> 队列式后端的 `image_size` 枚举
pub fn batch_image_size(aspect_ratio: &str) -> &'static str {
    match aspect_ratio {
        "1:1" => "square_hd",
        "16:9" => "landscape_16_9",
        "9:16" => "portrait_16_9",
        "4:3" => "landscape_4_3",
        "3:4" => "portrait_4_3",
        "21:9" => "landscape_16_9",
        _ => "square_hd",
    }
}

/// 宽高比 -> 对话补全后端的像素分辨率
pub fn chat_resolution(aspect_ratio: &str) -> &'static str {
    match aspect_ratio {
        "1:1" => "1024x1024",
        "16:9" => "1344x768",
        "9:16" => "768x1344",
        "4:3" => "1184x864",
        "3:4" => "864x1184",
        "2:3" => "832x1248",
        "3:2" => "1248x832",
        "21:9" => "1536x640",
        _ => "1024x1024",
    }
}

fn merge_parameters(arguments: &mut Map<String, Value>, parameters: &Map<String, Value>) {
    for (key, value) in parameters {
        arguments.insert(key.clone(), value.clone());
    }
}

// 参考图不覆盖动态参数中已有的键
fn attach_single(arguments: &mut Map<String, Value>, key: &str, reference: Option<&String>) {
    if let Some(url) = reference {
        arguments
            .entry(key.to_string())
            .or_insert_with(|| json!(url));
    }
}

fn attach_list(arguments: &mut Map<String, Value>, key: &str, references: &[String]) {
    if references.is_empty() {
        return;
    }
    let urls: Vec<&String> = references.iter().take(MAX_MULTI_REFERENCES).collect();
    arguments
        .entry(key.to_string())
        .or_insert_with(|| json!(urls));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(model_path: &str) -> ImageGeneration {
        ImageGeneration::new("a red cube", model_path)
    }

    fn params(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn test_batch_image_injects_size_from_aspect_ratio() {
        let resolver = ParameterResolver::default();
        let mut request = image("fal-ai/flux/dev");
        request.aspect_ratio = "9:16".to_string();

        let args = resolver.batch_image(&request);
        assert_eq!(args["prompt"], json!("a red cube"));
        assert_eq!(args["num_images"], json!(1));
        assert_eq!(args["safety_tolerance"], json!("2"));
        assert_eq!(args["image_size"], json!("portrait_16_9"));
    }

    #[test]
    fn test_batch_image_unknown_aspect_ratio_defaults() {
        let resolver = ParameterResolver::default();
        let mut request = image("fal-ai/flux/dev");
        request.aspect_ratio = "5:4".to_string();
        assert_eq!(resolver.batch_image(&request)["image_size"], json!("square_hd"));
        assert_eq!(batch_image_size("21:9"), "landscape_16_9");
    }

    #[test]
    fn test_schema_parameters_always_win() {
        let resolver = ParameterResolver::default();
        let mut request = image("fal-ai/flux/dev");
        request.aspect_ratio = "16:9".to_string();
        request.resolution = Some("800x600".to_string());
        request.parameters = params(json!({
            "image_size": "portrait_4_3",
            "num_images": 4,
            "image_url": "https://schema/ref.png"
        }));
        request.references = vec!["https://legacy/ref.png".to_string()];

        let args = resolver.batch_image(&request);
        assert_eq!(args["image_size"], json!("portrait_4_3"));
        assert_eq!(args["num_images"], json!(4));
        assert_eq!(args["image_url"], json!("https://schema/ref.png"));
    }

    #[test]
    fn test_aspect_ratio_param_suppresses_size_injection() {
        let resolver = ParameterResolver::default();
        let mut request = image("fal-ai/flux/dev");
        request.parameters = params(json!({ "aspect_ratio": "21:9" }));

        let args = resolver.batch_image(&request);
        assert_eq!(args["aspect_ratio"], json!("21:9"));
        assert!(!args.contains_key("image_size"));
    }

    #[test]
    fn test_explicit_resolution_becomes_structured() {
        let resolver = ParameterResolver::default();
        let mut request = image("fal-ai/flux/dev");
        request.resolution = Some("1280x720".to_string());
        assert_eq!(
            resolver.batch_image(&request)["image_size"],
            json!({ "width": 1280, "height": 720 })
        );

        request.resolution = Some("huge".to_string());
        assert_eq!(resolver.batch_image(&request)["image_size"], json!("square_hd"));
    }

    #[test]
    fn test_batch_references_single_and_multi() {
        let resolver = ParameterResolver::default();
        let refs: Vec<String> = (1..=4).map(|i| format!("https://ref/{i}.png")).collect();

        let mut single = image("fal-ai/flux/dev");
        single.references = refs.clone();
        let args = resolver.batch_image(&single);
        assert_eq!(args["image_url"], json!("https://ref/1.png"));
        assert!(!args.contains_key("image_urls"));

        let mut multi = image("fal-ai/nano-banana-pro/edit");
        multi.references = refs;
        let args = resolver.batch_image(&multi);
        assert_eq!(
            args["image_urls"],
            json!(["https://ref/1.png", "https://ref/2.png", "https://ref/3.png"])
        );
        assert!(!args.contains_key("image_url"));
    }

    #[test]
    fn test_batch_video_arguments() {
        let resolver = ParameterResolver::default();
        let mut request = VideoGeneration::new("a wave", "fal-ai/hunyuan-video");
        request.parameters = params(json!({ "duration": "10s" }));
        request.references = vec!["https://ref/start.png".to_string()];

        let args = resolver.batch_video(&request);
        assert_eq!(args["duration"], json!("10s"));
        assert_eq!(args["aspect_ratio"], json!("16:9"));
        assert_eq!(args["image_url"], json!("https://ref/start.png"));
    }

    #[test]
    fn test_catalog_image_arguments() {
        let resolver = ParameterResolver::default();
        let mut request = image("black-forest-labs/flux-schnell");
        request.aspect_ratio = "3:4".to_string();
        request.references = vec!["https://ref/a.png".to_string()];

        let args = resolver.catalog_image(&request);
        assert_eq!(args["aspect_ratio"], json!("3:4"));
        assert_eq!(args["image"], json!("https://ref/a.png"));

        let mut multi = image("google/multi-image-edit");
        multi.references = vec!["https://ref/a.png".to_string(), "https://ref/b.png".to_string()];
        let args = resolver.catalog_image(&multi);
        assert_eq!(
            args["image_input"],
            json!(["https://ref/a.png", "https://ref/b.png"])
        );
    }

    #[test]
    fn test_catalog_video_duration_and_frames() {
        let resolver = ParameterResolver::default();
        let mut request = VideoGeneration::new("a wave", "kwaivgi/kling-v2.1");
        request.references = vec![
            "https://ref/start.png".to_string(),
            "https://ref/end.png".to_string(),
        ];
        let args = resolver.catalog_video(&request);
        assert_eq!(args["duration"], json!(5));
        assert_eq!(args["start_image"], json!("https://ref/start.png"));
        assert_eq!(args["end_image"], json!("https://ref/end.png"));
        assert!(!args.contains_key("image"));

        request.duration = "long".to_string();
        request.references.truncate(1);
        let args = resolver.catalog_video(&request);
        assert!(!args.contains_key("duration"));
        assert_eq!(args["image"], json!("https://ref/start.png"));
    }

    #[test]
    fn test_chat_splits_sampling_and_injects_size() {
        let resolver = ParameterResolver::default();
        let mut request = image("google/gemini-2.5-flash-image");
        request.aspect_ratio = "16:9".to_string();
        request.parameters = params(json!({ "seed": 42, "temperature": 0.7, "style": "vivid" }));

        let chat = resolver.chat(&request);
        assert_eq!(chat.sampling["seed"], json!(42));
        assert_eq!(chat.sampling["temperature"], json!(0.7));
        assert_eq!(chat.extension["style"], json!("vivid"));
        assert_eq!(chat.extension["aspect_ratio"], json!("16:9"));
        assert_eq!(chat.extension["resolution"], json!("1344x768"));
        assert!(!chat.extension.contains_key("seed"));
    }

    #[test]
    fn test_chat_respects_schema_size_keys() {
        let resolver = ParameterResolver::default();
        let mut request = image("google/gemini-2.5-flash-image");
        request.parameters = params(json!({ "resolution": "2K" }));

        let chat = resolver.chat(&request);
        assert_eq!(chat.extension["resolution"], json!("2K"));
        assert!(!chat.extension.contains_key("aspect_ratio"));

        let mut explicit = image("google/gemini-2.5-flash-image");
        explicit.resolution = Some("640x480".to_string());
        assert_eq!(resolver.chat(&explicit).extension["resolution"], json!("640x480"));
        assert_eq!(chat_resolution("2:3"), "832x1248");
    }

    #[test]
    fn test_chat_reference_limits() {
        let resolver = ParameterResolver::default();
        let refs: Vec<String> = (1..=5).map(|i| format!("https://ref/{i}.png")).collect();

        let mut single = image("openai/gpt-image");
        single.references = refs.clone();
        assert_eq!(resolver.chat(&single).references.len(), 1);

        let mut multi = image("google/nano-banana");
        multi.references = refs;
        assert_eq!(resolver.chat(&multi).references.len(), MAX_MULTI_REFERENCES);
    }
}
