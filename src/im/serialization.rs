use flate2::read::GzDecoder;
use std::io::Read;

/// gzip 魔数
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// 判断数据是否为 gzip 压缩
pub fn is_gzip(data: &[u8]) -> bool {
    data.len() >= 2 && data[..2] == GZIP_MAGIC
}

/// 解压 gzip 数据
pub fn decompress_gzip(data: &[u8]) -> Result<Vec<u8>, std::io::Error> {
    let mut decoder = GzDecoder::new(data);
    let mut decompressed = Vec::new();
    decoder.read_to_end(&mut decompressed)?;
    Ok(decompressed)
}

/// 解压（如需要）后返回原始 JSON 字节
pub fn unwrap_frame(data: Vec<u8>) -> Result<Vec<u8>, std::io::Error> {
    if is_gzip(&data) {
        decompress_gzip(&data)
    } else {
        Ok(data)
    }
}

/// 生成客户端消息 ID（用户 ID + 随机后缀，保证同一进程内唯一）
pub fn generate_msg_id(user_id: &str) -> String {
    format!("{}{}", user_id, uuid::Uuid::new_v4().simple())
}

/// 生成邀请 ID
pub fn generate_invitation_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
